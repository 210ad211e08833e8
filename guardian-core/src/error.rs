//! Error types shared by every core component.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardianError {
    /// Malformed or missing fields at an ingestion or configuration boundary.
    /// Raised before any shared state is touched.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Calibration or threshold values that cannot be used.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GuardianError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        GuardianError::InvalidInput(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        GuardianError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;
