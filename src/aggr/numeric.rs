use std::any::Any;
use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::aggr::base::StreamAggr;
use crate::core::error::Result;
use crate::core::types::{FieldId, RecId};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct NumericState {
    window_ms: i64,
    window: VecDeque<(i64, f64)>,
    sum: f64,
    last_time_ms: i64,
}

/// Sliding-window numeric aggregate over one float field (`spec.md`
/// §4.9's "numeric" family): count, sum, min, max, avg over whatever
/// is currently inside the time window.
pub struct NumericAggr {
    name: String,
    time_field: FieldId,
    value_field: FieldId,
    state: NumericState,
}

impl NumericAggr {
    pub fn new(name: impl Into<String>, time_field: FieldId, value_field: FieldId, window_ms: i64) -> Self {
        NumericAggr { name: name.into(), time_field, value_field, state: NumericState { window_ms, ..Default::default() } }
    }

    fn evict(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.state.window_ms;
        while let Some(&(t, v)) = self.state.window.front() {
            if t < cutoff {
                self.state.window.pop_front();
                self.state.sum -= v;
            } else {
                break;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.state.window.len()
    }

    pub fn sum(&self) -> f64 {
        self.state.sum
    }

    pub fn avg(&self) -> f64 {
        if self.state.window.is_empty() {
            0.0
        } else {
            self.state.sum / self.state.window.len() as f64
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.state.window.iter().map(|&(_, v)| v).fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    pub fn max(&self) -> Option<f64> {
        self.state.window.iter().map(|&(_, v)| v).fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}

impl StreamAggr for NumericAggr {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        let time_ms = store.get_field(rec_id, self.time_field)?.as_timestamp()?.timestamp_millis();
        let value = store.get_field_flt(rec_id, self.value_field)?;
        self.state.window.push_back((time_ms, value));
        self.state.sum += value;
        self.state.last_time_ms = time_ms;
        self.evict(time_ms);
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
        !self.state.window.is_empty()
    }

    fn get_float(&self) -> Option<f64> {
        if self.is_init() {
            Some(self.avg())
        } else {
            None
        }
    }

    fn get_time_ms(&self) -> Option<i64> {
        self.is_init().then_some(self.state.last_time_ms)
    }
}

/// Splits a numeric aggregate by a group-key field, maintaining one
/// independent `NumericAggr` per observed group value.
pub struct GroupedNumericAggr {
    name: String,
    group_field: FieldId,
    time_field: FieldId,
    value_field: FieldId,
    window_ms: i64,
    groups: HashMap<String, NumericAggr>,
}

impl GroupedNumericAggr {
    pub fn new(name: impl Into<String>, group_field: FieldId, time_field: FieldId, value_field: FieldId, window_ms: i64) -> Self {
        GroupedNumericAggr { name: name.into(), group_field, time_field, value_field, window_ms, groups: HashMap::new() }
    }

    pub fn group(&self, key: &str) -> Option<&NumericAggr> {
        self.groups.get(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &NumericAggr)> {
        self.groups.iter()
    }
}

impl StreamAggr for GroupedNumericAggr {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        let key = store.get_field_str(rec_id, self.group_field)?;
        let (time_field, value_field, window_ms) = (self.time_field, self.value_field, self.window_ms);
        let sub = self.groups.entry(key.clone()).or_insert_with(|| NumericAggr::new(format!("{}[{}]", self.name, key), time_field, value_field, window_ms));
        sub.on_add_rec(store, rec_id)
    }

    fn on_update_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
        Ok(())
    }

    fn on_delete_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
        Ok(())
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        let snapshot: HashMap<&String, &NumericState> = self.groups.iter().map(|(k, v)| (k, &v.state)).collect();
        Ok(bincode::serialize(&snapshot)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let snapshot: HashMap<String, NumericState> = bincode::deserialize(data)?;
        let (time_field, value_field) = (self.time_field, self.value_field);
        self.groups = snapshot
            .into_iter()
            .map(|(key, state)| {
                let mut sub = NumericAggr::new(format!("{}[{}]", self.name, key), time_field, value_field, state.window_ms);
                sub.state = state;
                (key, sub)
            })
            .collect();
        Ok(())
    }

    fn is_init(&self) -> bool {
        !self.groups.is_empty()
    }
}
