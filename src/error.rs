//! Error types for external control operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlError>;

/// Status code reported alongside every failed controller operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCode {
    Ok = 0,
    Error = 1,
    Timeout = 3,
    Unsupported = 4,
}

impl ReturnCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Rejected by controller: {0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ControlError {
    /// Map the failure onto the controller status codes
    pub fn return_code(&self) -> ReturnCode {
        match self {
            ControlError::Timeout(_) => ReturnCode::Timeout,
            ControlError::Unsupported(_) => ReturnCode::Unsupported,
            _ => ReturnCode::Error,
        }
    }
}
