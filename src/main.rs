use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nlq_service::config::redact_url;
use nlq_service::{Config, GrpcServer, NlqEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nlq_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting NLQ Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("Configuration loaded:");
    info!("  gRPC Port: {}", config.grpc_port);
    info!(
        "  Catalog: {}",
        config
            .database_url
            .as_deref()
            .map(redact_url)
            .unwrap_or_else(|| "in-memory".to_string())
    );
    info!("  Tables DB: {}", config.tables_db_path.display());
    info!("  Language model: {}", config.llm.describe());

    let engine = Arc::new(NlqEngine::from_config(&config).await?);
    info!("NLQ engine initialized successfully");

    let grpc_server = GrpcServer::new(engine.clone());
    let grpc_addr: SocketAddr = ([0, 0, 0, 0], config.grpc_port).into();
    let grpc_handle = tokio::spawn(async move {
        if let Err(e) = grpc_server.start(grpc_addr).await {
            error!("gRPC server error: {}", e);
        }
    });

    info!("NLQ Service started successfully");
    info!("gRPC server listening on {}", grpc_addr);

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, gracefully shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    grpc_handle.abort();

    info!("NLQ Service shutdown complete");
    Ok(())
}
