//! Similarity queries over the feed corpus.
//!
//! The reference semantics is a linear scan: compute the distance from the
//! query digest to every feed entry, keep those within the threshold, sort
//! ascending with ties broken by feed insertion order. [`QueryIndex`] adds a
//! banding prefilter over length buckets for larger corpora; it returns the
//! identical result set, just with fewer full distance computations.

use std::collections::HashMap;

use crate::digest::distance::length_term;
use crate::digest::{distance, Digest};
use crate::feed::{FeedEntry, FeedStore};

/// A scored match, ephemeral query output.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceResult {
    pub entry: FeedEntry,
    pub distance: u32,
}

/// Linear-scan matcher. Suitable for corpora up to low tens of thousands of
/// entries; a threshold of 0 degenerates to exact-digest matching.
pub fn match_digest(store: &FeedStore, query: &Digest, max_distance: u32) -> Vec<DistanceResult> {
    rank(
        store
            .iterate_all()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let d = distance(query, &entry.digest);
                (i, entry, d)
            }),
        max_distance,
    )
}

fn rank(
    scored: impl Iterator<Item = (usize, FeedEntry, u32)>,
    max_distance: u32,
) -> Vec<DistanceResult> {
    let mut hits: Vec<(u32, usize, FeedEntry)> = scored
        .filter(|(_, _, d)| *d <= max_distance)
        .map(|(i, entry, d)| (d, i, entry))
        .collect();
    hits.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    hits.into_iter()
        .map(|(distance, _, entry)| DistanceResult { entry, distance })
        .collect()
}

/// Banding prefilter over a feed snapshot.
///
/// Entries are grouped by their digest's length bucket. A whole band can be
/// skipped when its length term alone already exceeds the threshold, since
/// every other distance term is non-negative. Performance optimization only:
/// results are identical to [`match_digest`].
pub struct QueryIndex {
    bands: HashMap<u8, Vec<usize>>,
    entries: Vec<FeedEntry>,
}

impl QueryIndex {
    /// Build an index from a consistent snapshot of the store.
    pub fn build(store: &FeedStore) -> Self {
        let entries = store.iterate_all();
        let mut bands: HashMap<u8, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            bands.entry(entry.digest.length_bucket()).or_default().push(i);
        }
        Self { bands, entries }
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match with band skipping. Identical result set to the linear scan.
    pub fn match_digest(&self, query: &Digest, max_distance: u32) -> Vec<DistanceResult> {
        let query_bucket = query.length_bucket();
        let mut scored = Vec::new();
        for (&bucket, members) in &self.bands {
            if length_term(query_bucket, bucket) > max_distance {
                continue;
            }
            for &i in members {
                let entry = &self.entries[i];
                scored.push((i, entry.clone(), distance(query, &entry.digest)));
            }
        }
        rank(scored.into_iter(), max_distance)
    }
}
