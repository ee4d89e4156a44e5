//! Configuration for sources, the feed store and the pipeline.
//!
//! Declarative, serde-deserializable configuration with sensible defaults.
//! One [`SourceConfig`] per tracked upstream; pipeline-wide limits live in
//! [`PipelineConfig`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScathaError};

/// Master configuration for a tracker deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracked upstream sources.
    pub sources: Vec<SourceConfig>,
    /// Feed store and cursor persistence locations.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Worker pool and retry limits.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl TrackerConfig {
    /// Parse a configuration document from JSON.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            return Err(ScathaError::InvalidConfig(
                "pipeline.concurrency must be at least 1".into(),
            ));
        }
        for source in &self.sources {
            if source.source_id.is_empty() {
                return Err(ScathaError::InvalidConfig("empty source_id".into()));
            }
            if source.min_artifact_size > source.max_artifact_size {
                return Err(ScathaError::InvalidConfig(format!(
                    "{}: min_artifact_size {} exceeds max_artifact_size {}",
                    source.source_id, source.min_artifact_size, source.max_artifact_size
                )));
            }
        }
        Ok(())
    }
}

/// One tracked repository/release source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository coordinate, e.g. "owner/repo".
    pub source_id: String,
    /// File extensions worth digesting (executables, archives, scripts).
    #[serde(default = "default_allow_list")]
    pub artifact_type_allow_list: Vec<String>,
    /// Artifacts below this are recorded as undigestible, not fetched.
    #[serde(default = "default_min_artifact_size")]
    pub min_artifact_size: u64,
    /// Artifacts above this are rejected rather than buffered.
    #[serde(default = "default_max_artifact_size")]
    pub max_artifact_size: u64,
    /// Scheduling hint for the caller, in seconds. Not enforced here.
    #[serde(default = "default_poll_interval_hint")]
    pub poll_interval_hint: u64,
}

fn default_allow_list() -> Vec<String> {
    ["exe", "dll", "so", "dylib", "bin", "elf", "zip", "gz", "xz", "sh", "ps1", "py"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_min_artifact_size() -> u64 {
    crate::digest::MIN_DIGEST_LEN as u64
}

fn default_max_artifact_size() -> u64 {
    104_857_600 // 100MB
}

fn default_poll_interval_hint() -> u64 {
    3600
}

impl SourceConfig {
    /// Whether an artifact path passes the type allow-list.
    pub fn allows_path(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        self.artifact_type_allow_list
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext.to_ascii_lowercase())))
            // Extension-less release binaries are common for Unix tools.
            || !lower.contains('.')
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            artifact_type_allow_list: default_allow_list(),
            min_artifact_size: default_min_artifact_size(),
            max_artifact_size: default_max_artifact_size(),
            poll_interval_hint: default_poll_interval_hint(),
        }
    }
}

/// Persistence locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Append-only feed record file (one JSON record per line).
    pub feed_path: PathBuf,
    /// Per-source polling cursors.
    pub cursor_path: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            feed_path: PathBuf::from("feed.jsonl"),
            cursor_path: PathBuf::from("cursors.json"),
        }
    }
}

/// Worker pool and retry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent fetch-and-digest tasks.
    pub concurrency: usize,
    /// Per-artifact timeout in seconds; an expired task counts as a fetch
    /// failure and stays eligible for the next run.
    pub fetch_timeout_secs: u64,
    /// Bounded retry attempts per artifact within one run.
    pub max_fetch_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout_secs: 120,
            max_fetch_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let raw = r#"{
            "sources": [{"source_id": "acme/tool"}],
            "feed": {"feed_path": "/tmp/feed.jsonl", "cursor_path": "/tmp/cursors.json"},
            "pipeline": {"concurrency": 2, "fetch_timeout_secs": 30, "max_fetch_attempts": 2, "backoff_base_ms": 100}
        }"#;
        let config = TrackerConfig::from_json_str(raw).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].source_id, "acme/tool");
        // Defaults fill the omitted source options
        assert_eq!(
            config.sources[0].min_artifact_size,
            crate::digest::MIN_DIGEST_LEN as u64
        );
        assert!(config.sources[0].poll_interval_hint > 0);
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = TrackerConfig::default();
        config.pipeline.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_size_bounds() {
        let mut config = TrackerConfig::default();
        config.sources.push(SourceConfig {
            source_id: "acme/tool".into(),
            min_artifact_size: 100,
            max_artifact_size: 50,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allow_list_matching() {
        let source = SourceConfig {
            source_id: "acme/tool".into(),
            artifact_type_allow_list: vec!["exe".into(), "sh".into()],
            ..Default::default()
        };
        assert!(source.allows_path("tool-v1.2.exe"));
        assert!(source.allows_path("install.SH"));
        assert!(source.allows_path("tool-linux-amd64")); // no extension
        assert!(!source.allows_path("README.md"));
    }
}
