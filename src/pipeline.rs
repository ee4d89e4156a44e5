//! Feed-maintenance pipeline.
//!
//! One run enumerates every configured source, fetches and digests new
//! candidate artifacts through a bounded worker pool, and appends the
//! results to the feed store. Failure isolation follows the error taxonomy:
//! artifact failures never abort a version, source failures never abort
//! other sources, and only store write failures abort the run. Digest
//! computation happens inside worker tasks; the store's writer lock is only
//! taken afterwards, for the append itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, SourceConfig, TrackerConfig};
use crate::digest;
use crate::error::{Result, ScathaError};
use crate::feed::{ArtifactId, FeedEntry, FeedStore};
use crate::fetcher::Fetcher;
use crate::hashing::sha256_fingerprint;
use crate::sources::SourceProvider;
use crate::timeout::{with_timeout, TimeoutConfig};
use crate::tracker::{Candidate, Tracker, VersionCandidates};

/// Exit signal for a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Every source reachable, every artifact accounted for.
    Success,
    /// Some artifacts or sources failed; failures are enumerated for retry.
    PartialSuccess,
    /// No configured source could be reached.
    TotalFailure,
}

/// Identity of a failed artifact, sufficient for an idempotent retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub source_id: String,
    pub artifact_path: String,
    pub version: String,
    pub reason: String,
}

/// Per-run outcome counts, as surfaced to operators.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub undigestible: usize,
    pub fetch_failed: usize,
    pub duplicate: usize,
    pub store_failed: usize,
    pub sources_total: usize,
    pub sources_reachable: usize,
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    pub fn status(&self) -> RunStatus {
        if self.sources_total > 0 && self.sources_reachable == 0 {
            RunStatus::TotalFailure
        } else if self.fetch_failed == 0
            && self.store_failed == 0
            && self.sources_reachable == self.sources_total
        {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        }
    }
}

/// Outcome of one fetch-and-digest task.
enum ArtifactOutcome {
    /// Digested and ready to append.
    Ready(Box<FeedEntry>),
    /// Too small to digest; recorded and counted as processed for cursor
    /// purposes, never retried.
    Undigestible { artifact: ArtifactId, length: u64 },
    /// Rejected by policy (oversize). Permanent for this artifact, so it
    /// does not hold the cursor back, but it is enumerated as a failure.
    Rejected { artifact: ArtifactId, reason: String },
    /// Transport failure after bounded retries; eligible again next run.
    FetchFailed { artifact: ArtifactId, reason: String },
}

/// Orchestrates tracker, fetcher, digest engine and feed store.
pub struct Pipeline {
    fetcher: Arc<Fetcher>,
    store: Arc<FeedStore>,
    tracker: Tracker,
    config: TrackerConfig,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        store: Arc<FeedStore>,
        tracker: Tracker,
        config: TrackerConfig,
    ) -> Self {
        Self {
            fetcher: Arc::new(Fetcher::new(provider)),
            store,
            tracker,
            config,
        }
    }

    /// Execute one full pipeline run over every configured source.
    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary {
            sources_total: self.config.sources.len(),
            ..Default::default()
        };
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.concurrency));

        let sources = self.config.sources.clone();
        for source in &sources {
            match self.run_source(source, &semaphore, &mut summary).await {
                Ok(()) => summary.sources_reachable += 1,
                Err(e) if e.is_fatal() => {
                    error!(source = %source.source_id, error = %e, "Store failure, aborting run");
                    summary.sources_reachable += 1;
                    break;
                }
                Err(e) => {
                    warn!(source = %source.source_id, error = %e, "Source skipped for this run");
                }
            }
        }

        info!(
            processed = summary.processed,
            undigestible = summary.undigestible,
            fetch_failed = summary.fetch_failed,
            duplicate = summary.duplicate,
            store_failed = summary.store_failed,
            status = ?summary.status(),
            "Pipeline run complete"
        );
        summary
    }

    /// Process one source. Returns `Err` for source-level failures
    /// (enumeration unreachable/malformed) and fatal store failures.
    async fn run_source(
        &mut self,
        source: &SourceConfig,
        semaphore: &Arc<Semaphore>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let batches = self.tracker.list_candidates(source).await?;

        // Versions are processed oldest first; the cursor only advances
        // through the longest fully confirmed prefix, so a failed version
        // keeps itself and everything after it eligible for the next run.
        let mut advance = true;
        for batch in &batches {
            let confirmed = self.run_version(source, batch, semaphore, summary).await?;
            if !confirmed {
                advance = false;
            }
            if advance {
                if let Err(e) = self.tracker.confirm_version(&source.source_id, &batch.version) {
                    warn!(
                        source = %source.source_id,
                        version = %batch.version,
                        error = %e,
                        "Cursor persist failed; version stays eligible for reprocessing"
                    );
                    advance = false;
                }
            }
        }
        Ok(())
    }

    /// Process all candidates of one version through the worker pool.
    /// Returns whether every artifact was confirmed (processed, duplicate,
    /// undigestible or policy-rejected).
    async fn run_version(
        &self,
        source: &SourceConfig,
        batch: &VersionCandidates,
        semaphore: &Arc<Semaphore>,
        summary: &mut RunSummary,
    ) -> Result<bool> {
        let mut tasks: JoinSet<ArtifactOutcome> = JoinSet::new();
        for candidate in batch.candidates.iter().cloned() {
            let semaphore = Arc::clone(semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let source = source.clone();
            let pipeline_config = self.config.pipeline.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                fetch_and_digest(&fetcher, &source, &candidate, &pipeline_config).await
            });
        }

        let mut confirmed = true;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(source = %source.source_id, error = %e, "Worker task aborted");
                    summary.fetch_failed += 1;
                    confirmed = false;
                    continue;
                }
            };
            match outcome {
                ArtifactOutcome::Ready(entry) => {
                    let artifact = entry.artifact.clone();
                    match self.store.append(*entry) {
                        Ok(()) => summary.processed += 1,
                        Err(ScathaError::Duplicate { .. }) => summary.duplicate += 1,
                        Err(e) => {
                            summary.store_failed += 1;
                            summary.failures.push(FailureRecord {
                                source_id: source.source_id.clone(),
                                artifact_path: artifact.path,
                                version: artifact.version,
                                reason: e.to_string(),
                            });
                            return Err(e);
                        }
                    }
                }
                ArtifactOutcome::Undigestible { artifact, length } => {
                    info!(
                        source = %source.source_id,
                        artifact = %artifact,
                        length,
                        "Recorded undigestible artifact"
                    );
                    summary.undigestible += 1;
                }
                ArtifactOutcome::Rejected { artifact, reason } => {
                    summary.fetch_failed += 1;
                    summary.failures.push(FailureRecord {
                        source_id: source.source_id.clone(),
                        artifact_path: artifact.path,
                        version: artifact.version,
                        reason,
                    });
                }
                ArtifactOutcome::FetchFailed { artifact, reason } => {
                    summary.fetch_failed += 1;
                    summary.failures.push(FailureRecord {
                        source_id: source.source_id.clone(),
                        artifact_path: artifact.path.clone(),
                        version: artifact.version.clone(),
                        reason,
                    });
                    confirmed = false;
                }
            }
        }
        Ok(confirmed)
    }

    /// Read access to the underlying store, for queries after a run.
    pub fn store(&self) -> &Arc<FeedStore> {
        &self.store
    }

    /// Explicit cursor reset for one source.
    pub fn reset_cursor(&mut self, source_id: &str) -> Result<()> {
        self.tracker.reset_cursor(source_id)
    }
}

/// Fetch one candidate with bounded retries and a per-attempt timeout, then
/// digest it. Never holds any lock; pure CPU work happens on the task.
async fn fetch_and_digest(
    fetcher: &Fetcher,
    source: &SourceConfig,
    candidate: &Candidate,
    config: &PipelineConfig,
) -> ArtifactOutcome {
    let artifact = ArtifactId::new(
        candidate.asset.path.clone(),
        candidate.asset.version.clone(),
    );

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let timeout = TimeoutConfig::new(
            config.fetch_timeout_secs,
            format!("fetch {}/{}", source.source_id, artifact),
        );
        match with_timeout(timeout, fetcher.fetch(source, &candidate.asset)).await {
            Ok(bytes) => {
                return match digest::digest(&bytes) {
                    Ok(d) => ArtifactOutcome::Ready(Box::new(FeedEntry {
                        source_id: source.source_id.clone(),
                        artifact,
                        digest: d,
                        fingerprint: sha256_fingerprint(&bytes),
                        length: bytes.len() as u64,
                        computed_at: Utc::now(),
                    })),
                    Err(_) => ArtifactOutcome::Undigestible {
                        artifact,
                        length: bytes.len() as u64,
                    },
                };
            }
            Err(ScathaError::Undigestible { length, .. }) => {
                return ArtifactOutcome::Undigestible {
                    artifact,
                    length: length as u64,
                };
            }
            Err(e @ ScathaError::Oversized { .. }) => {
                return ArtifactOutcome::Rejected {
                    artifact,
                    reason: e.to_string(),
                };
            }
            Err(e) if attempt < config.max_fetch_attempts => {
                let delay = config
                    .backoff_base_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1));
                debug!(
                    source = %source.source_id,
                    artifact = %artifact,
                    attempt,
                    delay_ms = delay,
                    error = %e,
                    "Fetch attempt failed, backing off"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                return ArtifactOutcome::FetchFailed {
                    artifact,
                    reason: e.to_string(),
                };
            }
        }
    }
}
