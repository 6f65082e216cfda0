//! Error types for the valuation pipeline

use std::time::Duration;
use thiserror::Error;

/// Result type alias for valuation operations
pub type Result<T> = std::result::Result<T, ValuationError>;

#[derive(Error, Debug)]
pub enum ValuationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Image capability unreachable, timed out, or unparseable after fallback.
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Invalid analysis: {0}")]
    InvalidAnalysis(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The reflective validator could not be constructed at all.
    #[error("Validation unavailable: {0}")]
    ValidationUnavailable(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Capability call timed out after {0:?}")]
    CapabilityTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ValuationError {
    /// Errors caused by the caller's payload rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ValuationError::InvalidAnalysis(_) | ValuationError::InvalidImage(_)
        )
    }
}
