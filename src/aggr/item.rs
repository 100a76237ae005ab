use std::any::Any;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::aggr::base::StreamAggr;
use crate::aggr::time_window::TimeWindow;
use crate::core::error::Result;
use crate::core::types::{FieldId, RecId};
use crate::store::Store;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ItemState {
    counts: HashMap<String, u64>,
    by_rec: HashMap<u64, String>,
}

/// Counts discrete field values inside a sliding time window
/// (`spec.md` §4.9's "item" family) — e.g. "how many records of each
/// category arrived in the last hour".
pub struct ItemAggr {
    name: String,
    time_field: FieldId,
    item_field: FieldId,
    window: TimeWindow,
    state: ItemState,
}

impl ItemAggr {
    pub fn new(name: impl Into<String>, time_field: FieldId, item_field: FieldId, window_ms: i64) -> Self {
        ItemAggr { name: name.into(), time_field, item_field, window: TimeWindow::new(window_ms, 0), state: ItemState::default() }
    }

    pub fn count_of(&self, item: &str) -> u64 {
        self.state.counts.get(item).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &HashMap<String, u64> {
        &self.state.counts
    }
}

impl StreamAggr for ItemAggr {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        let ts = store.get_field(rec_id, self.time_field)?.as_timestamp()?;
        let item = store.get_field_str(rec_id, self.item_field)?;

        *self.state.counts.entry(item.clone()).or_insert(0) += 1;
        self.state.by_rec.insert(rec_id.0, item);
        self.window.push(rec_id, ts);

        let state = &mut self.state;
        self.window.evict(ts, |dropped_rec, _| {
            if let Some(item) = state.by_rec.remove(&dropped_rec.0) {
                if let Some(count) = state.counts.get_mut(&item) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        state.counts.remove(&item);
                    }
                }
            }
        });
        Ok(())
    }

    fn on_update_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
        Ok(())
    }

    fn on_delete_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.state)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        self.state = bincode::deserialize(data)?;
        Ok(())
    }

    fn is_init(&self) -> bool {
        !self.window.is_empty()
    }
}
