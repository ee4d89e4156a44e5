//! Timeout utilities for bounding pipeline operations.
//!
//! Network fetches are the only suspension points in the system; this module
//! wraps them so a hung upstream cannot stall a run.

use crate::error::{Result, ScathaError};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Timeout configuration for pipeline operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Whether to log timeout warnings
    pub log_warnings: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_warnings: true,
            operation_name: operation.into(),
        }
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        "Starting operation '{}' with timeout of {}s",
        config.operation_name,
        config.duration.as_secs()
    );

    match timeout(config.duration, future).await {
        Ok(result) => result,
        Err(_) => {
            if config.log_warnings {
                error!(
                    "Operation '{}' timed out after {}s",
                    config.operation_name,
                    config.duration.as_secs()
                );
            }

            Err(ScathaError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_async_timeout_success() {
        let config = TimeoutConfig::new(1, "test_operation");

        let result = with_timeout(config, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_async_timeout_failure() {
        let config = TimeoutConfig::new(1, "test_operation");

        let result: Result<i32> = with_timeout(config, async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(42)
        })
        .await;

        assert!(matches!(result, Err(ScathaError::Timeout { .. })));
    }
}
