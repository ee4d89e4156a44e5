//! GitHub releases provider.
//!
//! Talks to the GitHub REST API for release listing and asset download.
//! The token comes from `GITHUB_TOKEN` (out-of-band); unauthenticated use
//! works for public repositories at a lower rate limit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tracing::debug;

use super::{AssetDescriptor, Release, SourceProvider};
use crate::error::{Result, ScathaError};

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Release response from the GitHub API.
#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    size: u64,
    browser_download_url: String,
}

/// GitHub-backed [`SourceProvider`]. `source_id` is an "owner/repo"
/// repository coordinate.
#[derive(Clone)]
pub struct GithubProvider {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubProvider {
    pub fn new() -> Self {
        Self::with_api_base(GITHUB_API_BASE)
    }

    /// Point the provider at a different API host (GitHub Enterprise, test
    /// fixtures).
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("scatha/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to create HTTP client"),
            api_base: api_base.into(),
            token: std::env::var("GITHUB_TOKEN").ok(),
        }
    }

    fn headers(&self, accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn get_releases(&self, source_id: &str) -> Result<Vec<GithubRelease>> {
        let url = format!(
            "{}/repos/{}/releases?per_page=100",
            self.api_base, source_id
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers("application/vnd.github+json"))
            .send()
            .await
            .map_err(|e| ScathaError::Fetch {
                source_name: source_id.to_string(),
                artifact: "release-listing".to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ScathaError::MalformedSource {
                source_name: source_id.to_string(),
                reason: format!("release listing returned {}", response.status()),
            });
        }

        response
            .json::<Vec<GithubRelease>>()
            .await
            .map_err(|e| ScathaError::MalformedSource {
                source_name: source_id.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Default for GithubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceProvider for GithubProvider {
    async fn list_releases(&self, source_id: &str) -> Result<Vec<Release>> {
        let mut releases: Vec<Release> = self
            .get_releases(source_id)
            .await?
            .into_iter()
            .filter(|r| !r.draft)
            .map(|r| Release {
                version: r.tag_name,
                published_at: r.published_at,
            })
            .collect();
        // The API lists newest first; the pipeline wants oldest first.
        releases.reverse();
        debug!(source = %source_id, releases = releases.len(), "Listed releases");
        Ok(releases)
    }

    async fn list_assets(&self, source_id: &str, version: &str) -> Result<Vec<AssetDescriptor>> {
        let releases = self.get_releases(source_id).await?;
        let release = releases
            .into_iter()
            .find(|r| r.tag_name == version)
            .ok_or_else(|| ScathaError::MalformedSource {
                source_name: source_id.to_string(),
                reason: format!("release {} disappeared from listing", version),
            })?;
        Ok(release
            .assets
            .into_iter()
            .map(|a| AssetDescriptor {
                path: a.name,
                version: version.to_string(),
                size: a.size,
                download_url: a.browser_download_url,
            })
            .collect())
    }

    async fn fetch_bytes(
        &self,
        source_id: &str,
        asset: &AssetDescriptor,
        max_size: u64,
    ) -> Result<Vec<u8>> {
        let fetch_err = |reason: String| ScathaError::Fetch {
            source_name: source_id.to_string(),
            artifact: asset.path.clone(),
            reason,
        };

        let mut response = self
            .client
            .get(&asset.download_url)
            .headers(self.headers("application/octet-stream"))
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("download returned {}", response.status())));
        }

        // Read incrementally so a lying Content-Length cannot balloon memory.
        let mut bytes = Vec::with_capacity(asset.size.min(max_size) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > max_size {
                return Err(ScathaError::Oversized {
                    size: bytes.len() as u64 + chunk.len() as u64,
                    limit: max_size,
                });
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!(
            source = %source_id,
            artifact = %asset.path,
            bytes = bytes.len(),
            "Fetched asset"
        );
        Ok(bytes)
    }
}
