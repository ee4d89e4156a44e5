//! Upstream source providers.
//!
//! Release-hosting platforms are abstracted behind the [`SourceProvider`]
//! capability trait (list releases, list assets, fetch bytes), one
//! implementation per platform, selected by configuration. Authentication
//! tokens are supplied out-of-band through the environment.

pub mod github;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// One release/version of a tracked source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Version or tag marker, e.g. "v1.4.2".
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A downloadable file within a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    /// File path/name within the release.
    pub path: String,
    /// Version/tag the asset shipped under.
    pub version: String,
    /// Declared byte length, as reported by the platform.
    pub size: u64,
    pub download_url: String,
}

/// Capability interface over a release-hosting platform.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Releases of a source, ordered oldest first.
    async fn list_releases(&self, source_id: &str) -> Result<Vec<Release>>;

    /// Assets of one release.
    async fn list_assets(&self, source_id: &str, version: &str) -> Result<Vec<AssetDescriptor>>;

    /// Raw bytes of one asset. Implementations must stop reading and fail
    /// once `max_size` is exceeded instead of buffering unbounded content.
    async fn fetch_bytes(&self, source_id: &str, asset: &AssetDescriptor, max_size: u64)
        -> Result<Vec<u8>>;
}
