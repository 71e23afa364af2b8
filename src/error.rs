use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("Unsupported file format: {filename}. Please upload CSV or Excel files.")]
    UnsupportedFormat { filename: String },

    #[error("Error reading file: {message}")]
    IngestError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Language model error: {0}")]
    OracleError(#[from] LlmError),

    #[error("{message}")]
    SqlExecutionError { message: String },

    #[error("Dataset not found: {dataset_id}")]
    DatasetNotFound { dataset_id: String },

    #[error("Please upload a dataset first.")]
    NoDatasetSelected,

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("Catalog error: {message}")]
    CatalogError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("gRPC transport error: {0}")]
    GrpcError(#[from] tonic::transport::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl From<diesel::result::Error> for NlqError {
    fn from(err: diesel::result::Error) -> Self {
        NlqError::CatalogError {
            message: format!("Database error: {}", err),
        }
    }
}

impl From<NlqError> for tonic::Status {
    fn from(err: NlqError) -> Self {
        match err {
            NlqError::DatasetNotFound { .. } => tonic::Status::not_found(err.to_string()),
            NlqError::UnsupportedFormat { .. }
            | NlqError::IngestError { .. }
            | NlqError::InvalidQuery { .. }
            | NlqError::NoDatasetSelected => tonic::Status::invalid_argument(err.to_string()),
            NlqError::OracleError(_) => tonic::Status::unavailable(err.to_string()),
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
