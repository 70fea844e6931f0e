//! Per-batch deduplication.
//!
//! Source archives are known to repeat rows. Within one batch the first record seen
//! for a key is kept and later ones are dropped without error. This is a data-quality
//! tradeoff: a conflicting later row in the same batch is lost silently. Across
//! batches nothing is deduplicated here; the store merge makes the last written
//! batch win.

use crate::models::{Batch, Record};
use std::collections::HashSet;
use tracing::debug;

/// Result of deduplicating one batch.
#[derive(Debug, Clone)]
pub struct Deduplicated<R> {
    pub batch: Batch<R>,
    pub duplicates_dropped: usize,
}

/// Keep the first record for each key, preserving encounter order.
pub fn deduplicate_first_wins<R: Record>(records: Vec<R>) -> (Vec<R>, usize) {
    let mut seen: HashSet<R::Key> = HashSet::with_capacity(records.len());
    let total = records.len();

    let kept: Vec<R> = records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect();

    let dropped = total - kept.len();
    (kept, dropped)
}

pub fn deduplicate_batch<R: Record>(batch: Batch<R>) -> Deduplicated<R> {
    let index = batch.index;
    let (records, duplicates_dropped) = deduplicate_first_wins(batch.records);

    if duplicates_dropped > 0 {
        debug!(
            "Batch {}: dropped {} duplicate {} records",
            index,
            duplicates_dropped,
            R::KIND
        );
    }

    Deduplicated {
        batch: Batch::new(index, records),
        duplicates_dropped,
    }
}
