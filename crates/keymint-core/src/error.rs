//! Error Taxonomy
//!
//! One variant per fulfillment step that can degrade. Only `Config`
//! aborts a fulfillment run (no secret means no key, and without a key
//! nothing downstream is meaningful); everything else is recovered
//! locally by the orchestrator and surfaced through the structured log.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Fulfillment error taxonomy
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or invalid configuration (e.g. empty license secret).
    /// Fatal to the run that needs it.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger unreachable or write failure. Recovered locally: the run
    /// continues without a durable record.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invoice document generation failure. Recovered locally: the
    /// notification proceeds without an attachment.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Notification transport or provider failure. Never surfaces past
    /// the detached dispatch task.
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl CoreError {
    /// Check if the error may succeed on a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Persistence(_) | CoreError::Dispatch(_))
    }

    /// Whether this error aborts the fulfillment run it occurs in
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_is_fatal() {
        assert!(CoreError::Config("no secret".into()).is_fatal());
        assert!(!CoreError::Persistence("db down".into()).is_fatal());
        assert!(!CoreError::Synthesis("render".into()).is_fatal());
        assert!(!CoreError::Dispatch("smtp".into()).is_fatal());
    }

    #[test]
    fn test_retryable() {
        assert!(CoreError::Persistence("db down".into()).is_retryable());
        assert!(!CoreError::Config("no secret".into()).is_retryable());
    }
}
