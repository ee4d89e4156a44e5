//! Error types for the Scatha similarity-feed engine.
//!
//! This module provides structured error handling using thiserror. The
//! taxonomy mirrors the failure isolation rules of the pipeline: per-artifact
//! errors never abort a run, per-source errors never abort other sources,
//! and only store-layer write failures are fatal.

use thiserror::Error;

/// Main error type for Scatha operations.
#[derive(Debug, Error)]
pub enum ScathaError {
    /// Input too short to produce a similarity digest. Recorded, not retried.
    #[error("Undigestible input: {length} bytes (minimum {minimum})")]
    Undigestible { length: usize, minimum: usize },

    /// Network/transport failure retrieving an artifact. Retried with backoff
    /// by the pipeline, then recorded as failed-this-run.
    #[error("Fetch failed for {source_name}/{artifact}: {reason}")]
    Fetch {
        source_name: String,
        artifact: String,
        reason: String,
    },

    /// Artifact exceeds the configured size ceiling.
    #[error("Artifact too large: {size} bytes (limit {limit})")]
    Oversized { size: u64, limit: u64 },

    /// Benign signal that an identical feed entry already exists.
    #[error("Duplicate feed entry for {source_name}/{artifact}")]
    Duplicate { source_name: String, artifact: String },

    /// Source enumeration returned unparseable data. The source is skipped
    /// for this run; other sources continue.
    #[error("Malformed source data from {source_name}: {reason}")]
    MalformedSource { source_name: String, reason: String },

    /// Persistence failure. Fatal for the current run; entries already
    /// appended remain valid.
    #[error("Feed store write failed: {0}")]
    StoreWrite(String),

    /// Per-artifact task timeout
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// A digest string that does not decode to the fixed digest width.
    #[error("Invalid digest encoding: {0}")]
    InvalidDigest(String),

    /// Unrecognized source or provider selection in configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Scatha operations
pub type Result<T> = std::result::Result<T, ScathaError>;

impl ScathaError {
    /// Whether this error aborts a whole pipeline run rather than a single
    /// artifact or source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScathaError::StoreWrite(_))
    }
}

impl From<serde_json::Error> for ScathaError {
    fn from(err: serde_json::Error) -> Self {
        ScathaError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScathaError::Undigestible {
            length: 12,
            minimum: 50,
        };
        assert_eq!(err.to_string(), "Undigestible input: 12 bytes (minimum 50)");

        let err = ScathaError::Fetch {
            source_name: "acme/tool".to_string(),
            artifact: "tool-linux-x64".to_string(),
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch failed for acme/tool/tool-linux-x64: connection reset"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(ScathaError::StoreWrite("disk full".into()).is_fatal());
        assert!(!ScathaError::Duplicate {
            source_name: "s".into(),
            artifact: "a".into()
        }
        .is_fatal());
        assert!(!ScathaError::Timeout { seconds: 30 }.is_fatal());
    }
}
