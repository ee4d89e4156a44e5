//! Source tracking: candidate enumeration and polling cursors.
//!
//! The tracker turns a configured source into the finite list of artifact
//! candidates that still need processing. Cursors record the last fully
//! processed version per source and only ever move forward; an explicit
//! reset is the single sanctioned rewind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{Result, ScathaError};
use crate::sources::{AssetDescriptor, SourceProvider};

/// One artifact candidate surfaced by enumeration.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source_id: String,
    pub asset: AssetDescriptor,
}

/// Candidates of one release version, processed as a unit for cursor
/// accounting.
#[derive(Debug, Clone)]
pub struct VersionCandidates {
    pub version: String,
    pub candidates: Vec<Candidate>,
}

/// Persisted per-source polling cursors.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CursorMap {
    cursors: HashMap<String, String>,
}

/// Durable cursor storage with atomic writes (temp file + rename).
pub struct CursorStore {
    path: PathBuf,
    map: CursorMap,
}

impl CursorStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            CursorMap::default()
        };
        Ok(Self { path, map })
    }

    /// Last fully processed version for a source, if any.
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.map.cursors.get(source_id).map(String::as_str)
    }

    /// Record that every artifact of `version` was confirmed processed.
    /// Persists immediately so a later crash cannot rewind the cursor.
    pub fn advance(&mut self, source_id: &str, version: &str) -> Result<()> {
        let prev = self
            .map
            .cursors
            .insert(source_id.to_string(), version.to_string());
        if prev.as_deref() != Some(version) {
            debug!(source = %source_id, cursor = %version, "Cursor advanced");
            self.persist()?;
        }
        Ok(())
    }

    /// Explicit cursor reset: the next run reprocesses the source from its
    /// oldest visible release.
    pub fn reset(&mut self, source_id: &str) -> Result<()> {
        if self.map.cursors.remove(source_id).is_some() {
            info!(source = %source_id, "Cursor reset");
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Enumerates what a source has published beyond its cursor.
pub struct Tracker {
    provider: Arc<dyn SourceProvider>,
    cursors: CursorStore,
}

impl Tracker {
    pub fn new(provider: Arc<dyn SourceProvider>, cursors: CursorStore) -> Self {
        Self { provider, cursors }
    }

    /// Candidate artifacts per release version, oldest version first,
    /// filtered by the source's artifact-type allow-list. Versions at or
    /// before the cursor are skipped without touching the network again.
    ///
    /// The sequence is finite and computed fresh per run; it is not
    /// restartable mid-stream (a new run enumerates from scratch).
    pub async fn list_candidates(&self, source: &SourceConfig) -> Result<Vec<VersionCandidates>> {
        let releases = self.provider.list_releases(&source.source_id).await?;
        if releases.is_empty() {
            return Err(ScathaError::MalformedSource {
                source_name: source.source_id.clone(),
                reason: "no releases visible".into(),
            });
        }

        // Everything strictly after the cursor still needs processing. A
        // cursor pointing at a vanished release falls back to the full list;
        // change detection in the feed keeps that idempotent.
        let cursor = self.cursors.get(&source.source_id);
        let start = match cursor {
            Some(version) => releases
                .iter()
                .position(|r| r.version == version)
                .map(|i| i + 1)
                .unwrap_or(0),
            None => 0,
        };

        let mut batches = Vec::new();
        for release in &releases[start..] {
            let assets = self
                .provider
                .list_assets(&source.source_id, &release.version)
                .await?;
            let candidates: Vec<Candidate> = assets
                .into_iter()
                .filter(|a| source.allows_path(&a.path))
                .map(|asset| Candidate {
                    source_id: source.source_id.clone(),
                    asset,
                })
                .collect();
            batches.push(VersionCandidates {
                version: release.version.clone(),
                candidates,
            });
        }
        info!(
            source = %source.source_id,
            cursor = cursor.unwrap_or("<none>"),
            pending_versions = batches.len(),
            "Enumerated candidates"
        );
        Ok(batches)
    }

    /// Confirm a fully processed version, advancing the persisted cursor.
    pub fn confirm_version(&mut self, source_id: &str, version: &str) -> Result<()> {
        self.cursors.advance(source_id, version)
    }

    /// Explicit cursor reset for one source.
    pub fn reset_cursor(&mut self, source_id: &str) -> Result<()> {
        self.cursors.reset(source_id)
    }

    /// Current cursor position, for run reporting.
    pub fn cursor(&self, source_id: &str) -> Option<&str> {
        self.cursors.get(source_id)
    }
}
