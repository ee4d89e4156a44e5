//! Append-only feed store.
//!
//! The feed is the persisted corpus of known-tool digests: one JSON record
//! per line, replayed into memory on open. Records are created once and
//! never mutated; a re-tracked artifact whose content changed appends a
//! superseding record instead of overwriting. Appends go through a single
//! writer lock so the uniqueness invariant holds under concurrent pipeline
//! tasks, while readers take consistent snapshots and never observe a
//! partially written entry.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::digest::Digest;
use crate::error::{Result, ScathaError};

/// Stable identity of an artifact within its source: release file path plus
/// the version/tag it shipped under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    pub path: String,
    pub version: String,
}

impl ArtifactId {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}

/// One persisted feed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub source_id: String,
    pub artifact: ArtifactId,
    pub digest: Digest,
    /// Conventional exact hash, used purely for change detection.
    pub fingerprint: String,
    pub length: u64,
    pub computed_at: DateTime<Utc>,
}

struct Inner {
    writer: BufWriter<File>,
    entries: Vec<FeedEntry>,
    /// Latest record index per (source, artifact) identity.
    index: HashMap<(String, ArtifactId), usize>,
}

/// Durable, append-only record of digested artifacts.
pub struct FeedStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl FeedStore {
    /// Open (or create) a feed file and replay its records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Vec::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
            let last = lines.len().saturating_sub(1);
            for (i, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FeedEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    // A torn final line can be left behind by a crashed run;
                    // anything earlier means the store itself is corrupt.
                    Err(e) if i == last => {
                        warn!(path = %path.display(), error = %e, "Ignoring torn trailing feed record");
                    }
                    Err(e) => {
                        return Err(ScathaError::Serialization(format!(
                            "corrupt feed record at line {}: {}",
                            i + 1,
                            e
                        )));
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            index.insert((entry.source_id.clone(), entry.artifact.clone()), i);
        }
        debug!(path = %path.display(), entries = entries.len(), "Feed store opened");

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                writer: BufWriter::new(file),
                entries,
                index,
            }),
        })
    }

    /// Append one entry.
    ///
    /// Re-ingesting an identical artifact (same identity, same fingerprint)
    /// returns [`ScathaError::Duplicate`], a benign no-op signal. The same
    /// identity with a changed fingerprint appends a superseding record.
    /// Write failures are fatal for the run; every append is flushed before
    /// it becomes visible to readers.
    pub fn append(&self, entry: FeedEntry) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ScathaError::StoreWrite("feed writer lock poisoned".into()))?;

        let key = (entry.source_id.clone(), entry.artifact.clone());
        if let Some(&existing) = inner.index.get(&key) {
            if inner.entries[existing].fingerprint == entry.fingerprint {
                return Err(ScathaError::Duplicate {
                    source_name: entry.source_id,
                    artifact: entry.artifact.to_string(),
                });
            }
            debug!(
                source = %entry.source_id,
                artifact = %entry.artifact,
                "Superseding feed entry with changed fingerprint"
            );
        }

        let mut line =
            serde_json::to_string(&entry).map_err(|e| ScathaError::StoreWrite(e.to_string()))?;
        line.push('\n');
        inner
            .writer
            .write_all(line.as_bytes())
            .map_err(|e| ScathaError::StoreWrite(e.to_string()))?;
        inner
            .writer
            .flush()
            .map_err(|e| ScathaError::StoreWrite(e.to_string()))?;

        let idx = inner.entries.len();
        inner.entries.push(entry);
        inner.index.insert(key, idx);
        Ok(())
    }

    /// All entries for one source, in insertion order.
    pub fn lookup_by_source(&self, source_id: &str) -> Vec<FeedEntry> {
        let inner = self.inner.read().expect("feed reader lock poisoned");
        inner
            .entries
            .iter()
            .filter(|e| e.source_id == source_id)
            .cloned()
            .collect()
    }

    /// Consistent snapshot of every entry, in insertion order.
    pub fn iterate_all(&self) -> Vec<FeedEntry> {
        let inner = self.inner.read().expect("feed reader lock poisoned");
        inner.entries.clone()
    }

    /// Latest record for an identity, if any.
    pub fn latest_for(&self, source_id: &str, artifact: &ArtifactId) -> Option<FeedEntry> {
        let inner = self.inner.read().expect("feed reader lock poisoned");
        inner
            .index
            .get(&(source_id.to_string(), artifact.clone()))
            .map(|&i| inner.entries[i].clone())
    }

    /// Fingerprint of the latest record for an identity, if any.
    pub fn fingerprint_of(&self, source_id: &str, artifact: &ArtifactId) -> Option<String> {
        self.latest_for(source_id, artifact).map(|e| e.fingerprint)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("feed reader lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing feed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Export every record to `dest` in the persisted line format. Importing
    /// the exported file with [`FeedStore::open`] reproduces an identical
    /// entry set.
    pub fn export(&self, dest: impl AsRef<Path>) -> Result<()> {
        let snapshot = self.iterate_all();
        let mut writer = BufWriter::new(File::create(dest)?);
        for entry in &snapshot {
            serde_json::to_writer(&mut writer, entry)
                .map_err(|e| ScathaError::StoreWrite(e.to_string()))?;
            writer
                .write_all(b"\n")
                .map_err(|e| ScathaError::StoreWrite(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| ScathaError::StoreWrite(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;

    fn entry(source: &str, path: &str, version: &str, payload: &[u8]) -> FeedEntry {
        FeedEntry {
            source_id: source.to_string(),
            artifact: ArtifactId::new(path, version),
            digest: digest(payload).unwrap(),
            fingerprint: crate::hashing::sha256_fingerprint(payload),
            length: payload.len() as u64,
            computed_at: Utc::now(),
        }
    }

    fn payload(tag: u8) -> Vec<u8> {
        (0..256u32).map(|i| (i as u8).wrapping_mul(tag) ^ tag).collect()
    }

    #[test]
    fn test_append_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedStore::open(dir.path().join("feed.jsonl")).unwrap();
        store.append(entry("acme/tool", "tool.exe", "v1.0", &payload(1))).unwrap();
        store.append(entry("acme/tool", "tool.sh", "v1.0", &payload(2))).unwrap();
        store.append(entry("zorg/kit", "kit.bin", "v0.3", &payload(3))).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.lookup_by_source("acme/tool").len(), 2);
        assert_eq!(store.lookup_by_source("zorg/kit").len(), 1);
        assert!(store.lookup_by_source("nobody/else").is_empty());
    }

    #[test]
    fn test_duplicate_is_benign_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedStore::open(dir.path().join("feed.jsonl")).unwrap();
        let e = entry("acme/tool", "tool.exe", "v1.0", &payload(1));
        store.append(e.clone()).unwrap();
        let err = store.append(e).unwrap_err();
        assert!(matches!(err, ScathaError::Duplicate { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_changed_fingerprint_supersedes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedStore::open(dir.path().join("feed.jsonl")).unwrap();
        let id = ArtifactId::new("tool.exe", "v1.0");
        store.append(entry("acme/tool", "tool.exe", "v1.0", &payload(1))).unwrap();
        store.append(entry("acme/tool", "tool.exe", "v1.0", &payload(9))).unwrap();

        // Both records survive; the index resolves to the newer one.
        assert_eq!(store.len(), 2);
        let latest = store.latest_for("acme/tool", &id).unwrap();
        assert_eq!(latest.fingerprint, crate::hashing::sha256_fingerprint(&payload(9)));
    }

    #[test]
    fn test_reopen_replays_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        {
            let store = FeedStore::open(&path).unwrap();
            store.append(entry("acme/tool", "tool.exe", "v1.0", &payload(1))).unwrap();
            store.append(entry("acme/tool", "tool.exe", "v1.1", &payload(2))).unwrap();
        }
        let reopened = FeedStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened
            .fingerprint_of("acme/tool", &ArtifactId::new("tool.exe", "v1.1"))
            .is_some());
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedStore::open(dir.path().join("feed.jsonl")).unwrap();
        for tag in 1..=5u8 {
            store
                .append(entry("acme/tool", &format!("asset-{}.bin", tag), "v1.0", &payload(tag)))
                .unwrap();
        }

        let exported = dir.path().join("export.jsonl");
        store.export(&exported).unwrap();
        let imported = FeedStore::open(&exported).unwrap();
        assert_eq!(imported.iterate_all(), store.iterate_all());
    }

    #[test]
    fn test_torn_trailing_line_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        {
            let store = FeedStore::open(&path).unwrap();
            store.append(entry("acme/tool", "tool.exe", "v1.0", &payload(1))).unwrap();
        }
        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"source_id\":\"acme/tool\",\"arti").unwrap();
        drop(file);

        let reopened = FeedStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_corrupt_mid_file_record_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        std::fs::write(&path, "not json at all\n{\"also\":\"broken\"\n").unwrap();
        assert!(FeedStore::open(&path).is_err());
    }

    #[test]
    fn test_serialized_appends_from_threads() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FeedStore::open(dir.path().join("feed.jsonl")).unwrap());
        let mut handles = Vec::new();
        for t in 0..4u8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..8u8 {
                    let _ = store.append(entry(
                        "acme/tool",
                        &format!("asset-{}-{}.bin", t, i),
                        "v1.0",
                        &payload(t.wrapping_mul(31).wrapping_add(i)),
                    ));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 32);
    }
}
