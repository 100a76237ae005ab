use std::any::Any;
use std::collections::HashMap;

use crate::core::error::Result;
use crate::core::types::RecId;
use crate::store::{Store, Trigger};

/// The observer interface every stream aggregate implements
/// (`spec.md` §4.9). Grounded on the original `TStreamAggr`/`IFltTm`
/// split: an aggregate reacts to store mutations and, if it produces a
/// scalar, exposes it through `get_float`/`get_time_ms` for chained
/// aggregates (e.g. `Ema`) to read.
pub trait StreamAggr: Any + Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str;
    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()>;
    fn on_update_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()>;
    fn on_delete_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()>;

    fn save_state(&self) -> Result<Vec<u8>>;
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
    fn is_init(&self) -> bool;

    fn get_float(&self) -> Option<f64> {
        None
    }
    fn get_int(&self) -> Option<i64> {
        None
    }
    fn get_time_ms(&self) -> Option<i64> {
        None
    }
}

struct EmaChain {
    ema_idx: usize,
    source_name: String,
}

/// One store's named collection of stream aggregates, fanned out from
/// that store's trigger list (`spec.md` §4.9). Per `spec.md` §7: a
/// misbehaving aggregate is logged and skipped, never allowed to abort
/// the record mutation that triggered it.
pub struct StreamAggrBase {
    store_name: String,
    aggrs: Vec<Box<dyn StreamAggr>>,
    name_to_idx: HashMap<String, usize>,
    ema_chains: Vec<EmaChain>,
}

impl StreamAggrBase {
    pub fn new(store_name: impl Into<String>) -> Self {
        StreamAggrBase { store_name: store_name.into(), aggrs: Vec::new(), name_to_idx: HashMap::new(), ema_chains: Vec::new() }
    }

    pub fn register(&mut self, aggr: Box<dyn StreamAggr>) -> usize {
        let idx = self.aggrs.len();
        self.name_to_idx.insert(aggr.name().to_string(), idx);
        self.aggrs.push(aggr);
        idx
    }

    /// Registers an `Ema` that should be fed from `source_name`'s
    /// `get_float`/`get_time_ms` output after every mutation.
    pub fn register_ema_chain(&mut self, ema: Box<dyn StreamAggr>, source_name: impl Into<String>) -> Result<usize> {
        let idx = self.register(ema);
        self.ema_chains.push(EmaChain { ema_idx: idx, source_name: source_name.into() });
        Ok(idx)
    }

    pub fn get(&self, name: &str) -> Option<&dyn StreamAggr> {
        self.name_to_idx.get(name).map(|&i| self.aggrs[i].as_ref())
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(StreamAggr::get_float)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(StreamAggr::get_int)
    }

    pub fn is_init(&self) -> bool {
        self.aggrs.iter().all(|a| a.is_init())
    }

    pub fn save_state(&self) -> Result<Vec<u8>> {
        let mut snapshots = Vec::with_capacity(self.aggrs.len());
        for aggr in &self.aggrs {
            snapshots.push((aggr.name().to_string(), aggr.save_state()?));
        }
        Ok(bincode::serialize(&snapshots)?)
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let snapshots: Vec<(String, Vec<u8>)> = bincode::deserialize(data)?;
        for (name, state) in snapshots {
            if let Some(&idx) = self.name_to_idx.get(&name) {
                self.aggrs[idx].load_state(&state)?;
            }
        }
        Ok(())
    }

    fn feed_ema_chains(&mut self) {
        for chain in &self.ema_chains {
            let fed = self.aggrs.iter().find(|a| a.name() == chain.source_name).and_then(|a| {
                if a.is_init() {
                    a.get_float().zip(a.get_time_ms())
                } else {
                    None
                }
            });
            if let Some((value, time_ms)) = fed {
                if let Some(ema) = self.aggrs[chain.ema_idx].as_any_mut().downcast_mut::<crate::aggr::ema::Ema>() {
                    ema.feed(value, time_ms);
                }
            }
        }
    }

    fn dispatch(&mut self, store: &Store, rec_id: RecId, mut call: impl FnMut(&mut dyn StreamAggr, &Store, RecId) -> Result<()>) {
        for aggr in &mut self.aggrs {
            if let Err(e) = call(aggr.as_mut(), store, rec_id) {
                eprintln!("[warn] stream aggregate '{}' on store '{}' failed for rec {}: {}", aggr.name(), self.store_name, rec_id.0, e);
            }
        }
        self.feed_ema_chains();
    }
}

impl Trigger for StreamAggrBase {
    fn name(&self) -> &str {
        "stream_aggr_base"
    }

    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        self.dispatch(store, rec_id, |a, s, r| a.on_add_rec(s, r));
        Ok(())
    }

    fn on_update_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        self.dispatch(store, rec_id, |a, s, r| a.on_update_rec(s, r));
        Ok(())
    }

    fn on_delete_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        self.dispatch(store, rec_id, |a, s, r| a.on_delete_rec(s, r));
        Ok(())
    }
}
