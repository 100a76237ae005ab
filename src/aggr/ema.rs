use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::aggr::base::StreamAggr;
use crate::core::error::Result;
use crate::core::types::RecId;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum EmaType {
    /// Uses the last observed inter-arrival time as the decay interval.
    Previous,
    /// A fixed decay interval regardless of arrival spacing.
    Interval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmaState {
    init: bool,
    value: f64,
    last_time_ms: i64,
}

/// Exponential moving average chained on another named aggregate's
/// `get_float`/`get_time_ms` output (`spec.md` §4.9's "EMA" family).
/// Grounded 1:1 on `original_source`'s `TEma`/`TSignalProc::TEma`: it
/// never reads the store directly, only `StreamAggrBase::feed_ema_chains`
/// feeding it the source's latest value.
pub struct Ema {
    name: String,
    decay_ms: f64,
    ema_type: EmaType,
    state: EmaState,
}

impl Ema {
    pub fn new(name: impl Into<String>, decay_ms: f64, ema_type: EmaType) -> Self {
        Ema { name: name.into(), decay_ms, ema_type, state: EmaState { init: false, value: 0.0, last_time_ms: 0 } }
    }

    pub fn value(&self) -> f64 {
        self.state.value
    }

    /// Updates the EMA from a freshly observed `(value, time_ms)` pair.
    pub fn feed(&mut self, value: f64, time_ms: i64) {
        if !self.state.init {
            self.state.value = value;
            self.state.last_time_ms = time_ms;
            self.state.init = true;
            return;
        }

        let dt = (time_ms - self.state.last_time_ms).max(0) as f64;
        let interval = match self.ema_type {
            EmaType::Previous => dt.max(1.0),
            EmaType::Interval => self.decay_ms,
        };
        let alpha = 1.0 - (-dt / interval.max(1.0)).exp();
        self.state.value += alpha * (value - self.state.value);
        self.state.last_time_ms = time_ms;
    }
}

impl StreamAggr for Ema {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_add_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
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
        self.state.init
    }

    fn get_float(&self) -> Option<f64> {
        self.state.init.then_some(self.state.value)
    }

    fn get_time_ms(&self) -> Option<i64> {
        self.state.init.then_some(self.state.last_time_ms)
    }
}
