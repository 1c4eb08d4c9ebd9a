//! Error types for ESPCam services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EspcamError>;

#[derive(Error, Debug)]
pub enum EspcamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
