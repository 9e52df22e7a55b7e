use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Import job not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("OAuth token invalid or expired for service {0}")]
    TokenExpiredOrInvalid(String),

    #[error("Download from provider failed: {0}")]
    DataDownload(String),

    #[error("Invalid import request: {0}")]
    InvalidRequest(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ImportError {
    /// Whether the provider reported the stored token as dead.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, ImportError::TokenExpiredOrInvalid(_))
    }

    /// Transient provider failures that validity checks swallow.
    pub fn is_data_download(&self) -> bool {
        matches!(self, ImportError::DataDownload(_))
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
