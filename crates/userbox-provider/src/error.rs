//! Error types for container runtimes

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to connect to container runtime: {0}")]
    ConnectionError(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("Unexpected runtime output: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] userbox_config::ConfigError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timed out after {secs}s waiting for `{operation}`")]
    Timeout { operation: String, secs: u64 },
}

pub type Result<T> = std::result::Result<T, ProviderError>;
