use serde::{Deserialize, Serialize};

use crate::core::types::{Freq, RecId};

/// A single entry of a posting list: a record id and its frequency.
/// `freq == 0` is a tombstone — written to mark deletion, dropped by
/// `Merger::normalize` (`spec.md` §4.2, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingItem {
    pub rec_id: RecId,
    pub freq: Freq,
}

impl PostingItem {
    pub fn new(rec_id: RecId, freq: Freq) -> Self {
        PostingItem { rec_id, freq }
    }
}

/// Sorted-by-`RecId` sequence of `(RecId, Freq)` for one `(KeyId, WordId)`.
/// After `Merger::normalize` this is strictly sorted with no non-positive
/// frequencies (P3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingList(pub Vec<PostingItem>);

impl PostingList {
    pub fn new() -> Self {
        PostingList(Vec::new())
    }

    pub fn from_sorted(items: Vec<PostingItem>) -> Self {
        debug_assert!(items.windows(2).all(|w| w[0].rec_id < w[1].rec_id));
        PostingList(items)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn rec_ids(&self) -> Vec<RecId> {
        self.0.iter().map(|p| p.rec_id).collect()
    }

    pub fn contains(&self, rec_id: RecId) -> bool {
        self.0.binary_search_by_key(&rec_id, |p| p.rec_id).is_ok()
    }

    pub fn byte_size(&self) -> usize {
        self.0.len() * std::mem::size_of::<PostingItem>()
    }

    /// Approximate encoded-size estimate for disk-flush accounting:
    /// delta + vbyte on the sorted RecId column, plus a fixed per-item
    /// cost for the freq column.
    pub fn encoded_size_estimate(&self) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        let mut size = 4usize;
        let mut prev = self.0[0].rec_id.0;
        for item in &self.0[1..] {
            let delta = item.rec_id.0.wrapping_sub(prev);
            size += vbyte_len(delta);
            prev = item.rec_id.0;
        }
        size + self.0.len() * 4
    }
}

fn vbyte_len(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 128 {
        v >>= 7;
        n += 1;
    }
    n
}
