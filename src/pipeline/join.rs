//! Window joiner — inner join of the two scorer sides by message id.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::pipeline::types::{JoinedRecord, ScoredMessage};

/// Joins positive and negative scores of one window.
///
/// The join index exists only for the duration of [`WindowJoiner::join`];
/// nothing is carried from one window to the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowJoiner;

impl WindowJoiner {
    pub fn new() -> Self {
        Self
    }

    /// Emit one record per id present on both sides, ordered by id.
    ///
    /// A side carrying the same id more than once keeps the last occurrence.
    pub fn join(
        &self,
        positive: Vec<ScoredMessage>,
        negative: Vec<ScoredMessage>,
    ) -> Vec<JoinedRecord> {
        let positive_len = positive.len();
        let negative_len = negative.len();

        let mut negative_index: HashMap<u64, ScoredMessage> = HashMap::with_capacity(negative_len);
        for scored in negative {
            negative_index.insert(scored.id, scored);
        }

        let mut positive_index: BTreeMap<u64, ScoredMessage> = BTreeMap::new();
        for scored in positive {
            positive_index.insert(scored.id, scored);
        }

        let joined: Vec<JoinedRecord> = positive_index
            .into_values()
            .filter_map(|pos| {
                let neg = negative_index.remove(&pos.id)?;
                Some(JoinedRecord {
                    id: pos.id,
                    text: pos.text,
                    positive_score: pos.score,
                    negative_score: neg.score,
                })
            })
            .collect();

        debug!(
            positive = positive_len,
            negative = negative_len,
            joined = joined.len(),
            unmatched_negative = negative_index.len(),
            "Joined window sides"
        );
        joined
    }
}
