//! Scatha: a similarity-digest feed engine for threat hunting.
//!
//! Scatha maintains a corpus of similarity-preserving digests ("fuzzy
//! hashes") for artifacts published by tracked open-source repositories, and
//! answers distance queries against that corpus so analysts can recognize
//! variants, repackaged binaries and lightly modified forks of known tools.
//!
//! The crate splits into a pure algorithmic core and an async maintenance
//! pipeline around it:
//!
//! - [`digest`] computes fixed-width digests from raw bytes and scores the
//!   distance between two digests. Stateless, no I/O.
//! - [`sources`] abstracts release-hosting platforms behind a capability
//!   trait, with a GitHub implementation.
//! - [`tracker`] enumerates what a source published beyond its cursor.
//! - [`fetcher`] retrieves candidate bytes under size guards.
//! - [`feed`] is the append-only store of digested artifacts.
//! - [`query`] matches a digest against the feed, optionally banded.
//! - [`pipeline`] orchestrates a full fetch-and-digest run.

/// Declarative source, feed and pipeline configuration.
pub mod config;
/// Similarity digest computation and distance scoring.
pub mod digest;
/// Error taxonomy.
pub mod error;
/// Append-only feed store.
pub mod feed;
/// Size-guarded artifact retrieval.
pub mod fetcher;
/// Conventional exact-hash fingerprints.
pub mod hashing;
/// Tracing initialization.
pub mod logging;
/// Run orchestration.
pub mod pipeline;
/// Similarity queries over the feed.
pub mod query;
/// Upstream source providers.
pub mod sources;
/// Timeout helpers for the pipeline layer.
pub mod timeout;
/// Candidate enumeration and polling cursors.
pub mod tracker;

pub use config::{FeedConfig, PipelineConfig, SourceConfig, TrackerConfig};
pub use digest::{digest, distance, Digest};
pub use error::{Result, ScathaError};
pub use feed::{ArtifactId, FeedEntry, FeedStore};
pub use pipeline::{Pipeline, RunStatus, RunSummary};
pub use query::{match_digest, DistanceResult, QueryIndex};
