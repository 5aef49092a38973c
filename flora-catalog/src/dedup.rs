//! Cross-source deduplication
//!
//! Sources are walked in priority order and records in provider order. The
//! first record seen for a dedup key wins; later ones are dropped whole, no
//! field merging. Records without a usable name are always kept.

use crate::aggregator::PartialResults;
use crate::types::{CanonicalRecord, SourceId};
use std::collections::HashSet;

/// Merge per-source results into one ordered list
///
/// Sources missing from `priority` follow the listed ones in the order they
/// appear in `results`.
pub fn merge(results: &PartialResults, priority: &[SourceId]) -> Vec<CanonicalRecord> {
    let mut order: Vec<SourceId> = priority.to_vec();
    for result in results.iter() {
        if !order.contains(&result.source) {
            order.push(result.source);
        }
    }

    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for source in order {
        let Some(result) = results.get(source) else {
            continue;
        };

        for record in &result.records {
            match record.dedup_key() {
                Some(key) => {
                    if seen.insert(key) {
                        merged.push(record.clone());
                    }
                }
                None => merged.push(record.clone()),
            }
        }
    }

    merged
}
