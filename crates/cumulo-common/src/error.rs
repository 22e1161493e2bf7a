//! Error types for the Cumulo usage exporter
//!
//! Provides a unified error type covering the whole taxonomy: construction
//! failures, malformed upstream payloads, transient backend trouble, weight
//! refresh problems, and fatal startup conditions.

use thiserror::Error;

/// Result type alias using CumuloError
pub type Result<T> = std::result::Result<T, CumuloError>;

/// Unified error type for Cumulo operations
#[derive(Debug, Error)]
pub enum CumuloError {
    /// Bad machine parameters; raised at construction, never later
    #[error("Invalid machine spec: {0}")]
    InvalidSpec(String),

    /// A backend response was missing expected keys or carried wrong types.
    /// Scope is one instance or one project; callers skip and continue.
    #[error("Malformed upstream payload ({context}): {detail}")]
    MalformedPayload { context: String, detail: String },

    /// Transient backend failure; the affected cycle is skipped
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Weight table refresh failed; the previous table stays in effect
    #[error("Weight refresh failed: {0}")]
    WeightRefresh(String),

    /// Could not authenticate against the control plane. Fatal at startup.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // IO errors (fixture reads, listener setup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CumuloError {
    /// Shorthand for a malformed-payload error with context
    pub fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        CumuloError::MalformedPayload {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for CumuloError {
    fn from(err: serde_json::Error) -> Self {
        CumuloError::Serialization(err.to_string())
    }
}
