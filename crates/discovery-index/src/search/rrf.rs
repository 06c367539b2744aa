//! Reciprocal Rank Fusion.
//!
//! RRF score = sum(1 / (k + rank_i)) over every list the key appears in,
//! with 1-based ranks. Raw source scores are ignored.

use std::collections::{HashMap, HashSet};

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// A key after fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub key: String,
    pub score: f64,
    /// 1-based rank in each input list, `None` where the key is absent
    pub ranks: Vec<Option<usize>>,
}

impl FusedHit {
    /// Whether list `index` contributed to this hit.
    pub fn in_list(&self, index: usize) -> bool {
        self.ranks.get(index).copied().flatten().is_some()
    }
}

/// Fuse ranked key lists and keep the best `limit`.
///
/// A key repeated within one list keeps its best (first) rank. Ties keep
/// the order in which keys were first encountered, earlier lists first.
pub fn reciprocal_rank_fusion<S: AsRef<str>>(
    lists: &[Vec<S>],
    k: f64,
    limit: usize,
) -> Vec<FusedHit> {
    let mut fused = fuse(lists, k);
    fused.truncate(limit);
    fused
}

/// Fuse without truncating.
pub fn fuse<S: AsRef<str>>(lists: &[Vec<S>], k: f64) -> Vec<FusedHit> {
    let mut hits: Vec<FusedHit> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (list_index, list) in lists.iter().enumerate() {
        let mut seen: HashSet<&str> = HashSet::new();
        for (offset, key) in list.iter().enumerate() {
            let key = key.as_ref();
            if !seen.insert(key) {
                continue;
            }
            let rank = offset + 1;

            let position = *positions.entry(key.to_string()).or_insert_with(|| {
                hits.push(FusedHit {
                    key: key.to_string(),
                    score: 0.0,
                    ranks: vec![None; lists.len()],
                });
                hits.len() - 1
            });

            let hit = &mut hits[position];
            hit.score += 1.0 / (k + rank as f64);
            hit.ranks[list_index] = Some(rank);
        }
    }

    // sort_by is stable, so equal scores stay in first-encounter order
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}
