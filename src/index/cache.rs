//! Hot posting-list cache sitting in front of the on-disk Gix files.
//! Grounded on the teacher's buffer-pool sizing idiom
//! (`memory/buffer_pool.rs`'s size-tracked eviction) combined with the
//! `lru` crate for the actual recency bookkeeping, since the teacher
//! already depends on `lru` for the same job elsewhere in its reader
//! stack.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::core::types::{KeyId, WordId};
use crate::index::posting::PostingList;

/// `(KeyId, WordId)` identifies one posting list inside one key's
/// vocabulary.
type CacheKey = (KeyId, WordId);

/// Size-bounded, size-first/recency-second eviction cache: entries are
/// evicted oldest-first, but only down to `target_bytes` — a cache well
/// under budget never evicts purely for recency's sake.
pub struct PostingCache {
    entries: LruCache<CacheKey, PostingList>,
    cache_size_bytes: usize,
    current_bytes: usize,
    dirty: std::collections::HashSet<CacheKey>,
}

impl PostingCache {
    pub fn new(cache_size_bytes: usize) -> Self {
        PostingCache {
            entries: LruCache::new(NonZeroUsize::new(usize::MAX).unwrap()),
            cache_size_bytes,
            current_bytes: 0,
            dirty: std::collections::HashSet::new(),
        }
    }

    pub fn get(&mut self, key: CacheKey) -> Option<&PostingList> {
        self.entries.get(&key)
    }

    /// Inserts or replaces a posting list, marking it dirty (needs a
    /// flush before eviction or close) and evicting the coldest clean
    /// entries until the cache is back under budget.
    pub fn put(&mut self, key: CacheKey, list: PostingList) {
        if let Some(old) = self.entries.peek(&key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.byte_size());
        }
        self.current_bytes += list.byte_size();
        self.dirty.insert(key);
        self.entries.put(key, list);
        self.evict_to_budget();
    }

    pub fn put_clean(&mut self, key: CacheKey, list: PostingList) {
        if let Some(old) = self.entries.peek(&key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.byte_size());
        }
        self.current_bytes += list.byte_size();
        self.entries.put(key, list);
        self.evict_to_budget();
    }

    pub fn is_dirty(&self, key: &CacheKey) -> bool {
        self.dirty.contains(key)
    }

    pub fn mark_flushed(&mut self, key: &CacheKey) {
        self.dirty.remove(key);
    }

    /// Every dirty entry, oldest access first — used to flush on close.
    pub fn dirty_entries(&self) -> Vec<CacheKey> {
        self.dirty.iter().copied().collect()
    }

    fn evict_to_budget(&mut self) {
        while self.current_bytes > self.cache_size_bytes {
            let victim = self
                .entries
                .iter()
                .rev()
                .find(|(k, _)| !self.dirty.contains(*k))
                .map(|(k, _)| *k);

            let Some(victim) = victim else { break };
            if let Some(evicted) = self.entries.pop(&victim) {
                self.current_bytes = self.current_bytes.saturating_sub(evicted.byte_size());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting::PostingItem;
    use crate::core::types::RecId;

    fn list(n: usize) -> PostingList {
        PostingList((0..n as u64).map(|i| PostingItem::new(RecId(i), 1)).collect())
    }

    #[test]
    fn evicts_clean_entries_before_dirty() {
        let item_size = std::mem::size_of::<PostingItem>();
        let mut cache = PostingCache::new(item_size * 4);
        cache.put_clean((KeyId(1), WordId(1)), list(2));
        cache.put((KeyId(1), WordId(2)), list(2));
        cache.put_clean((KeyId(1), WordId(3)), list(2));

        assert!(cache.get((KeyId(1), WordId(2))).is_some());
    }
}
