use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] coy_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid relationship status: {0}")]
    InvalidStatus(String),
    #[error("Invalid replay script: {0}")]
    InvalidScript(String),
}
