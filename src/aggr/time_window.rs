use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::core::types::RecId;

/// Sliding time-window FIFO shared by the numeric/grouped/item
/// aggregate families (`spec.md` §4.9, invariant P8: a record older
/// than `window_ms` is never counted). Grounded on the teacher's
/// `memory/buffer_pool.rs` size-tracked eviction idiom, re-keyed from
/// byte budgets to a time budget.
pub struct TimeWindow {
    pub window_ms: i64,
    pub min_time_ms: i64,
    fifo: VecDeque<(RecId, DateTime<Utc>)>,
}

impl TimeWindow {
    pub fn new(window_ms: i64, min_time_ms: i64) -> Self {
        TimeWindow { window_ms, min_time_ms, fifo: VecDeque::new() }
    }

    pub fn push(&mut self, rec_id: RecId, timestamp: DateTime<Utc>) {
        self.fifo.push_back((rec_id, timestamp));
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn newest_time(&self) -> Option<DateTime<Utc>> {
        self.fifo.back().map(|(_, t)| *t)
    }

    /// Drops every entry older than `now - window_ms`, invoking
    /// `on_drop` for each one so the owning aggregate can retract its
    /// contribution.
    pub fn evict(&mut self, now: DateTime<Utc>, mut on_drop: impl FnMut(RecId, DateTime<Utc>)) {
        let cutoff = now - chrono::Duration::milliseconds(self.window_ms);
        while let Some(&(rec_id, ts)) = self.fifo.front() {
            if ts < cutoff {
                self.fifo.pop_front();
                on_drop(rec_id, ts);
            } else {
                break;
            }
        }
    }
}
