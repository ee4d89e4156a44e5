//! Size-guarded artifact retrieval.
//!
//! Wraps a [`SourceProvider`] with the per-source size limits: undersized
//! candidates are reported as undigestible without being fetched (but still
//! logged, so operators notice a tool shipping trivial artifacts), and
//! oversized ones are rejected rather than buffered. Retries belong to the
//! pipeline, not here.

use std::sync::Arc;

use tracing::warn;

use crate::config::SourceConfig;
use crate::digest::MIN_DIGEST_LEN;
use crate::error::{Result, ScathaError};
use crate::sources::{AssetDescriptor, SourceProvider};

pub struct Fetcher {
    provider: Arc<dyn SourceProvider>,
}

impl Fetcher {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self { provider }
    }

    /// Retrieve the raw bytes of one candidate asset.
    ///
    /// The declared size is checked before any network traffic; the actual
    /// byte count is checked again after download since declared sizes are
    /// untrusted input.
    pub async fn fetch(&self, source: &SourceConfig, asset: &AssetDescriptor) -> Result<Vec<u8>> {
        let min = source.min_artifact_size.max(MIN_DIGEST_LEN as u64);
        if asset.size < min {
            warn!(
                source = %source.source_id,
                artifact = %asset.path,
                version = %asset.version,
                size = asset.size,
                "Undersized artifact, recording as undigestible without fetching"
            );
            return Err(ScathaError::Undigestible {
                length: asset.size as usize,
                minimum: min as usize,
            });
        }
        if asset.size > source.max_artifact_size {
            return Err(ScathaError::Oversized {
                size: asset.size,
                limit: source.max_artifact_size,
            });
        }

        let bytes = self
            .provider
            .fetch_bytes(&source.source_id, asset, source.max_artifact_size)
            .await?;

        if (bytes.len() as u64) < min {
            warn!(
                source = %source.source_id,
                artifact = %asset.path,
                version = %asset.version,
                size = bytes.len(),
                "Artifact smaller than declared and below digest minimum"
            );
            return Err(ScathaError::Undigestible {
                length: bytes.len(),
                minimum: min as usize,
            });
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Release;
    use async_trait::async_trait;

    struct FixedProvider {
        payload: Vec<u8>,
    }

    #[async_trait]
    impl SourceProvider for FixedProvider {
        async fn list_releases(&self, _source_id: &str) -> Result<Vec<Release>> {
            Ok(Vec::new())
        }

        async fn list_assets(
            &self,
            _source_id: &str,
            _version: &str,
        ) -> Result<Vec<AssetDescriptor>> {
            Ok(Vec::new())
        }

        async fn fetch_bytes(
            &self,
            _source_id: &str,
            _asset: &AssetDescriptor,
            max_size: u64,
        ) -> Result<Vec<u8>> {
            if self.payload.len() as u64 > max_size {
                return Err(ScathaError::Oversized {
                    size: self.payload.len() as u64,
                    limit: max_size,
                });
            }
            Ok(self.payload.clone())
        }
    }

    fn asset(size: u64) -> AssetDescriptor {
        AssetDescriptor {
            path: "tool.bin".into(),
            version: "v1.0".into(),
            size,
            download_url: "https://example.invalid/tool.bin".into(),
        }
    }

    fn source(min: u64, max: u64) -> SourceConfig {
        SourceConfig {
            source_id: "acme/tool".into(),
            min_artifact_size: min,
            max_artifact_size: max,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_within_bounds() {
        let fetcher = Fetcher::new(Arc::new(FixedProvider {
            payload: vec![7u8; 500],
        }));
        let bytes = fetcher.fetch(&source(50, 1024), &asset(500)).await.unwrap();
        assert_eq!(bytes.len(), 500);
    }

    #[tokio::test]
    async fn test_undersized_is_undigestible_without_fetch() {
        let fetcher = Fetcher::new(Arc::new(FixedProvider {
            payload: vec![7u8; 10],
        }));
        let err = fetcher.fetch(&source(50, 1024), &asset(10)).await.unwrap_err();
        assert!(matches!(err, ScathaError::Undigestible { length: 10, .. }));
    }

    #[tokio::test]
    async fn test_oversized_declared_size_rejected() {
        let fetcher = Fetcher::new(Arc::new(FixedProvider {
            payload: vec![7u8; 500],
        }));
        let err = fetcher.fetch(&source(50, 100), &asset(500)).await.unwrap_err();
        assert!(matches!(err, ScathaError::Oversized { size: 500, limit: 100 }));
    }

    #[tokio::test]
    async fn test_actual_size_below_minimum_rejected() {
        // Declared size passes the guard, delivered bytes do not.
        let fetcher = Fetcher::new(Arc::new(FixedProvider {
            payload: vec![7u8; 20],
        }));
        let err = fetcher.fetch(&source(50, 1024), &asset(500)).await.unwrap_err();
        assert!(matches!(err, ScathaError::Undigestible { length: 20, .. }));
    }
}
