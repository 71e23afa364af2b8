pub mod proto {
    pub mod nlq {
        tonic::include_proto!("nlq");
    }
}

pub mod catalog;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod database;
pub mod dataset_manager;
pub mod domain;
pub mod engine;
pub mod error;
pub mod executor;
pub mod grpc_server;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod render;
pub mod sanitize;
pub mod schema;
pub mod storage;
pub mod synthesizer;

pub use config::Config;
pub use engine::NlqEngine;
pub use error::NlqError;
pub use grpc_server::GrpcServer;
