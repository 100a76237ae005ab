//! The root object (`spec.md` §2/§3/§11): owns schema, vocabulary, Gix,
//! stores and stream-aggregate bases, and is the only thing embedders
//! construct directly. Grounded on the teacher's `core/database.rs`
//! `Database` — same role (single entry point wiring every component
//! together, `create`/`open`/`close` lifecycle) — but trimmed of its
//! `Arc<RwLock<..>>`/MVCC/query-cache/transaction-manager fields: §5
//! mandates a single-threaded, cooperative core with no internal
//! locking, so `Base` holds everything by plain ownership instead.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggr::{StreamAggr, StreamAggrBase};
use crate::analysis::AnalyzerRegistry;
use crate::core::config::{Config, OovRangePolicy, OpenMode};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldId, FieldValue, JoinId, KeyId, RecId, StoreId, WordId};
use crate::geo::GeoIndex;
use crate::index::Gix;
use crate::logger::Logger;
use crate::operators::{GroupBy, LinSearch, LinSearchOp, SplitBy};
use crate::query::{parse_query, ExecutionContext, Executor, Query, SchemaLookup};
use crate::schema::store_schema::link_inverse_joins;
use crate::schema::{FieldType, IndexKey, JoinDesc, JoinKind, KeyKind, StoreSchema};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{SegmentId, StoredRow};
use crate::storage::segment_reader::SegmentReader;
use crate::storage::segment_writer::SegmentWriter;
use crate::storage::wal::{Operation, Wal, WalEntry};
use crate::store::{RecordSet, Store};
use crate::vocab::{IndexVoc, SortType};

/// Which of the three built-in operators a registered name resolves
/// to (`spec.md` §4.10's "name → Operator registry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    LinSearch,
    GroupBy,
    SplitBy,
}

/// Field/index join declaration shorthand passed to [`Base::define_join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSpec {
    Field,
    Index,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSchema {
    stores: Vec<StoreSchema>,
    next_store_id: u8,
}

pub struct Base {
    config: Config,
    logger: Logger,
    layout: StorageLayout,

    store_name_to_id: HashMap<String, StoreId>,
    stores: HashMap<StoreId, Store>,
    next_store_id: u8,

    index_voc: IndexVoc,
    gix: Gix,
    /// Logs every mutation right after it lands in its store, replayed
    /// on the next `Update` open (crash recovery) and truncated on a
    /// clean `close` or after a successful replay/restore (§6).
    wal: Wal,
    geo_indexes: HashMap<KeyId, GeoIndex>,
    /// Every registered key, independent of which store's schema also
    /// lists it — the global namespace `spec.md` §4.1 describes.
    keys: HashMap<KeyId, IndexKey>,

    stream_aggr_bases: HashMap<StoreId, StreamAggrBase>,
    analyzers: AnalyzerRegistry,
    operators: HashMap<String, OperatorKind>,

    read_only: bool,
}

impl Base {
    /// Opens (or creates) a base rooted at `config.storage_path`,
    /// dispatching on `config.open_mode` per `spec.md` §3's Lifecycle
    /// paragraph.
    pub fn open(config: Config) -> Result<Self> {
        let layout = StorageLayout::new(config.storage_path.clone())?;
        let logger = Logger::new(config.log_verbosity);

        match config.open_mode {
            OpenMode::Create => {
                if layout.base_exists() {
                    return Err(Error::new(ErrorKind::AlreadyOpen, "base already exists at this path"));
                }
                Self::fresh(config, logger, layout)
            }
            OpenMode::Update => Self::reload(config, logger, layout, false),
            OpenMode::ReadOnly => Self::reload(config, logger, layout, true),
            OpenMode::Restore => Self::restore(config, logger, layout),
        }
    }

    fn fresh(config: Config, logger: Logger, layout: StorageLayout) -> Result<Self> {
        let gix = Gix::new(layout.clone(), config.cache_size_bytes, false);
        let wal = Wal::open(&layout, 0)?;
        Ok(Base {
            read_only: false,
            gix,
            wal,
            layout,
            logger,
            store_name_to_id: HashMap::new(),
            stores: HashMap::new(),
            next_store_id: 0,
            index_voc: IndexVoc::new(),
            geo_indexes: HashMap::new(),
            keys: HashMap::new(),
            stream_aggr_bases: HashMap::new(),
            analyzers: AnalyzerRegistry::new(),
            operators: default_operators(),
            config,
        })
    }

    fn reload(config: Config, logger: Logger, layout: StorageLayout, read_only: bool) -> Result<Self> {
        if !layout.base_exists() {
            return Err(Error::new(ErrorKind::MissingIndex, "no base found at this path"));
        }
        let mut base = Self::fresh(config, logger, layout)?;
        base.read_only = read_only;
        base.gix = Gix::new(base.layout.clone(), base.config.cache_size_bytes, read_only);
        base.load_schema()?;
        base.load_index_voc()?;
        base.load_geo_indexes()?;
        base.reload_store_rows()?;
        if !read_only {
            base.recover_wal()?;
        }
        Ok(base)
    }

    fn restore(config: Config, logger: Logger, layout: StorageLayout, ) -> Result<Self> {
        if !layout.base_exists() {
            return Err(Error::new(ErrorKind::MissingIndex, "no base found at this path"));
        }
        let mut base = Self::fresh(config, logger, layout)?;
        base.load_schema()?;
        base.reload_store_rows()?;
        // Derived structures (vocabulary, Gix, geo) are rebuilt from
        // the stores themselves rather than trusted from disk — the
        // whole point of `OpenMode::Restore`.
        for store_id in base.store_ids() {
            for rec_id in base.store(store_id)?.get_all_recs() {
                base.index_record(store_id, rec_id)?;
            }
        }
        // Stream-aggregate state is intentionally not replayed: bulk
        // reload does not preserve original event timing, and
        // aggregates aren't registered yet at this point in the
        // lifecycle (the caller registers them after `open` returns).
        base.wal.truncate()?;
        Ok(base)
    }

    /// Replays any write-ahead-log entries left over from a session that
    /// never reached a clean `close` (crash recovery, `spec.md` §6).
    /// Entries reconstruct exactly the effects `add_rec`/`set_field`/
    /// `del_rec`/`add_join`/`del_join` already produced the first time —
    /// index update and stream-aggregate fan-out included — against the
    /// possibly-stale row snapshot `reload_store_rows` just loaded.
    fn recover_wal(&mut self) -> Result<()> {
        let entries: Vec<WalEntry> = self.wal.read_entries()?;
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            self.replay_operation(entry.operation)?;
        }
        self.wal.truncate()?;
        Ok(())
    }

    fn replay_operation(&mut self, op: Operation) -> Result<()> {
        match op {
            Operation::AddRec { store, rec_id, fields } => {
                self.store_mut(store)?.add_rec_at(rec_id, fields)?;
                self.index_record(store, rec_id)?;
                self.dispatch_add(store, rec_id);
            }
            Operation::SetField { store, rec_id, field, value } => self.set_field_inner(store, rec_id, field, value)?,
            Operation::DelRec { store, rec_id } => self.del_rec_inner(store, rec_id)?,
            Operation::AddJoin { store, rec_id, join, target, freq } => self.add_join_inner(store, join, rec_id, target, freq)?,
            Operation::DelJoin { store, rec_id, join, target } => self.del_join_inner(store, join, rec_id, target)?,
            Operation::Commit => {}
        }
        Ok(())
    }

    fn store_ids(&self) -> Vec<StoreId> {
        let mut ids: Vec<StoreId> = self.stores.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Flushes vocabulary, geo index, dirty Gix entries and every
    /// store's rows, then releases the base. A no-op on a read-only
    /// base (`spec.md` §5's "flush on close when not read-only").
    pub fn close(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.gix.flush()?;
        self.save_schema()?;
        self.save_index_voc()?;
        self.save_geo_indexes()?;
        self.save_stream_aggr_state()?;
        self.flush_store_rows()?;
        self.wal.truncate()?;
        Ok(())
    }

    /// Replays every store's saved stream-aggregate state onto the
    /// aggregates currently registered. Not called automatically by
    /// `open` — aggregates aren't registered yet at that point in the
    /// lifecycle, so the caller registers them first and then calls
    /// this explicitly.
    pub fn load_stream_aggr_state(&mut self) -> Result<()> {
        let path = self.layout.stream_aggr_path();
        if !path.exists() {
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let snapshots: HashMap<StoreId, Vec<u8>> = bincode::deserialize(&bytes)?;
        for (store_id, data) in snapshots {
            if let Some(base) = self.stream_aggr_bases.get_mut(&store_id) {
                base.load_state(&data)?;
            }
        }
        Ok(())
    }

    fn save_stream_aggr_state(&self) -> Result<()> {
        let mut snapshots: HashMap<StoreId, Vec<u8>> = HashMap::new();
        for (store_id, base) in &self.stream_aggr_bases {
            snapshots.insert(*store_id, base.save_state()?);
        }
        std::fs::write(self.layout.stream_aggr_path(), bincode::serialize(&snapshots)?)?;
        Ok(())
    }

    // ---- schema registration -------------------------------------

    pub fn create_store(&mut self, name: impl Into<String>) -> Result<StoreId> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly, "base is read-only"));
        }
        let name = name.into();
        if self.store_name_to_id.contains_key(&name) {
            return Err(Error::new(ErrorKind::NameCollision, format!("store '{}' already exists", name)));
        }
        let store_id = StoreId(self.next_store_id);
        self.next_store_id = self.next_store_id.checked_add(1).ok_or_else(|| Error::new(ErrorKind::Internal, "store id space exhausted"))?;
        self.store_name_to_id.insert(name.clone(), store_id);
        self.stores.insert(store_id, Store::new(StoreSchema::new(store_id, name)));
        self.stream_aggr_bases.insert(store_id, StreamAggrBase::new(self.stores[&store_id].schema().store_name.clone()));
        Ok(store_id)
    }

    pub fn add_field(&mut self, store_id: StoreId, name: impl Into<String>, field_type: FieldType) -> Result<FieldId> {
        self.store_mut(store_id)?.schema_mut().add_field(name, field_type)
    }

    pub fn add_value_key(&mut self, store_id: StoreId, key_name: impl Into<String>, field_id: FieldId, sort_type: SortType) -> Result<KeyId> {
        let key_name = key_name.into();
        let key_id = self.index_voc.add_key(store_id, &key_name)?;
        let key = IndexKey::value(key_id, key_name, field_id, sort_type);
        self.store_mut(store_id)?.schema_mut().add_key(key.clone())?;
        self.keys.insert(key_id, key);
        Ok(key_id)
    }

    pub fn add_text_key(&mut self, store_id: StoreId, key_name: impl Into<String>, field_id: FieldId, tokenizer: impl Into<String>) -> Result<KeyId> {
        let key_name = key_name.into();
        let key_id = self.index_voc.add_key(store_id, &key_name)?;
        let key = IndexKey::text(key_id, key_name, field_id, tokenizer);
        self.store_mut(store_id)?.schema_mut().add_key(key.clone())?;
        self.keys.insert(key_id, key);
        Ok(key_id)
    }

    pub fn add_location_key(&mut self, store_id: StoreId, key_name: impl Into<String>, field_id: FieldId) -> Result<KeyId> {
        let key_name = key_name.into();
        let key_id = self.index_voc.add_key(store_id, &key_name)?;
        let key = IndexKey::location(key_id, key_name, field_id);
        self.store_mut(store_id)?.schema_mut().add_key(key.clone())?;
        self.keys.insert(key_id, key);
        self.geo_indexes.insert(key_id, GeoIndex::new(self.config.geo_precision));
        Ok(key_id)
    }

    /// Declares one side of a join. `spec.md` §4.5: a field-join
    /// allocates two hidden fields on `store_id`; an index-join
    /// allocates an internal Gix key. Registering a join whose target
    /// store doesn't exist yet ⇒ `ForwardJoinReference`.
    pub fn define_join(&mut self, store_id: StoreId, name: impl Into<String>, target_store_id: StoreId, spec: JoinSpec) -> Result<JoinId> {
        let name = name.into();
        if !self.stores.contains_key(&target_store_id) {
            return Err(Error::new(ErrorKind::ForwardJoinReference, format!("join '{}' targets a store that doesn't exist yet", name)));
        }

        let join_desc = match spec {
            JoinSpec::Field => {
                let store = self.store_mut(store_id)?;
                let rec_field = store.schema_mut().add_internal_field(format!("{}Id", name), FieldType::UInt64)?;
                let fq_field = store.schema_mut().add_internal_field(format!("{}Fq", name), FieldType::Int)?;
                JoinDesc::field_join(JoinId(0), name, target_store_id, rec_field, fq_field)
            }
            JoinSpec::Index => {
                let key_name = format!("{}Key", name);
                let key_id = self.index_voc.add_key(store_id, &key_name)?;
                let key = IndexKey::internal(key_id, key_name, FieldId(u16::MAX));
                self.keys.insert(key_id, key.clone());
                self.store_mut(store_id)?.schema_mut().add_key(key)?;
                JoinDesc::index_join(JoinId(0), name, target_store_id, key_id)
            }
        };
        self.store_mut(store_id)?.schema_mut().add_join(join_desc)
    }

    /// Wires `join_a` (on `store_a`) and `join_b` (on `store_b`) as
    /// each other's inverse, per `spec.md` §3's P2 invariant.
    pub fn link_inverse(&mut self, store_a: StoreId, join_a: JoinId, store_b: StoreId, join_b: JoinId) -> Result<()> {
        if store_a == store_b {
            let schema = self.store_mut(store_a)?.schema_mut();
            schema.join_mut(join_a)?.inverse_join_id = Some(join_b);
            schema.join_mut(join_b)?.inverse_join_id = Some(join_a);
            return Ok(());
        }
        let (left, right) = self.two_stores_mut(store_a, store_b)?;
        link_inverse_joins(left.schema_mut(), join_a, right.schema_mut(), join_b)
    }

    fn two_stores_mut(&mut self, a: StoreId, b: StoreId) -> Result<(&mut Store, &mut Store)> {
        if a == b {
            return Err(Error::new(ErrorKind::Internal, "expected two distinct stores"));
        }
        let ptr = &mut self.stores as *mut HashMap<StoreId, Store>;
        // SAFETY: `a != b`, so the two `get_mut` calls below touch
        // disjoint entries of the map; this is the usual "two mutable
        // borrows into different HashMap slots" pattern.
        unsafe {
            let left = (*ptr).get_mut(&a).ok_or_else(|| Error::new(ErrorKind::UnknownStore, format!("{:?}", a)))?;
            let right = (*ptr).get_mut(&b).ok_or_else(|| Error::new(ErrorKind::UnknownStore, format!("{:?}", b)))?;
            Ok((left, right))
        }
    }

    pub fn register_stream_aggr(&mut self, store_id: StoreId, aggr: Box<dyn StreamAggr>) -> Result<()> {
        self.stream_aggr_bases
            .get_mut(&store_id)
            .ok_or_else(|| Error::new(ErrorKind::UnknownStore, format!("{:?}", store_id)))?
            .register(aggr);
        Ok(())
    }

    pub fn register_ema_chain(&mut self, store_id: StoreId, ema: Box<dyn StreamAggr>, source_name: impl Into<String>) -> Result<()> {
        self.stream_aggr_bases
            .get_mut(&store_id)
            .ok_or_else(|| Error::new(ErrorKind::UnknownStore, format!("{:?}", store_id)))?
            .register_ema_chain(ema, source_name)?;
        Ok(())
    }

    pub fn aggr_float(&self, store_id: StoreId, name: &str) -> Option<f64> {
        self.stream_aggr_bases.get(&store_id).and_then(|b| b.get_float(name))
    }

    pub fn aggr_int(&self, store_id: StoreId, name: &str) -> Option<i64> {
        self.stream_aggr_bases.get(&store_id).and_then(|b| b.get_int(name))
    }

    pub fn register_operator(&mut self, name: impl Into<String>, kind: OperatorKind) {
        self.operators.insert(name.into(), kind);
    }

    pub fn operator_kind(&self, name: &str) -> Result<OperatorKind> {
        self.operators.get(name).copied().ok_or_else(|| Error::new(ErrorKind::UnsupportedOperator, format!("no operator registered as '{}'", name)))
    }

    pub fn lin_search(&self, set: &RecordSet, field_id: FieldId, op: &LinSearchOp) -> Result<RecordSet> {
        LinSearch::apply(self.store(set.store_id)?, set, field_id, op)
    }

    pub fn group_by(&self, set: &RecordSet, field_id: FieldId) -> Result<Vec<(String, RecordSet)>> {
        GroupBy::apply(self.store(set.store_id)?, set, field_id)
    }

    pub fn split_by(&self, set: &RecordSet, field_id: FieldId, delta: f64) -> Result<Vec<RecordSet>> {
        SplitBy::apply(self.store(set.store_id)?, set, field_id, delta)
    }

    // ---- record mutation --------------------------------------------

    /// Adds a JSON record to `store_id`. Per `spec.md` §4.4/§4.5:
    /// fields are validated and written first, then every declared
    /// key indexes the new row, then the store's stream-aggregate
    /// base fans out, then nested join payloads are recursively
    /// inserted into their target stores and wired up.
    pub fn add_rec(&mut self, store_id: StoreId, json: &Value) -> Result<RecId> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly, "base is read-only"));
        }
        let obj = json.as_object().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "record must be a JSON object"))?;
        let schema = self.store(store_id)?.schema().clone();

        let mut fields = Vec::new();
        for field in schema.fields() {
            if field.internal {
                continue;
            }
            if let Some(v) = obj.get(&field.name) {
                fields.push((field.field_id, field_value_from_json(field.field_type, v)?));
            }
        }

        let rec_id = self.store_mut(store_id)?.add_rec(fields.clone())?;
        self.wal.append(Operation::AddRec { store: store_id, rec_id, fields })?;
        self.index_record(store_id, rec_id)?;
        self.dispatch_add(store_id, rec_id);

        for join in schema.joins() {
            let Some(jval) = obj.get(&join.name) else { continue };
            match join.kind {
                JoinKind::Index => {
                    let arr = jval.as_array().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, format!("join '{}' expects an array", join.name)))?;
                    for child in arr {
                        let target_id = self.add_rec(join.join_store_id, child)?;
                        self.add_join(store_id, join.join_id, rec_id, target_id, 1)?;
                    }
                }
                JoinKind::Field => {
                    let target_id = self.add_rec(join.join_store_id, jval)?;
                    self.add_join(store_id, join.join_id, rec_id, target_id, 1)?;
                }
            }
        }

        Ok(rec_id)
    }

    pub fn set_field(&mut self, store_id: StoreId, rec_id: RecId, field_id: FieldId, value: FieldValue) -> Result<()> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly, "base is read-only"));
        }
        self.wal.append(Operation::SetField { store: store_id, rec_id, field: field_id, value: value.clone() })?;
        self.set_field_inner(store_id, rec_id, field_id, value)
    }

    fn set_field_inner(&mut self, store_id: StoreId, rec_id: RecId, field_id: FieldId, value: FieldValue) -> Result<()> {
        let affected: Vec<IndexKey> = self
            .store(store_id)?
            .schema()
            .keys()
            .iter()
            .filter(|k| k.field_id == field_id && !k.is_internal())
            .cloned()
            .collect();

        for key in &affected {
            self.deindex_key(store_id, rec_id, key)?;
        }
        self.store_mut(store_id)?.set_field(rec_id, field_id, value)?;
        for key in &affected {
            self.index_key(store_id, rec_id, key)?;
        }
        self.dispatch_update(store_id, rec_id);
        Ok(())
    }

    pub fn del_rec(&mut self, store_id: StoreId, rec_id: RecId) -> Result<()> {
        if self.read_only {
            return Err(Error::new(ErrorKind::ReadOnly, "base is read-only"));
        }
        self.wal.append(Operation::DelRec { store: store_id, rec_id })?;
        self.del_rec_inner(store_id, rec_id)
    }

    fn del_rec_inner(&mut self, store_id: StoreId, rec_id: RecId) -> Result<()> {
        self.deindex_record(store_id, rec_id)?;
        self.store_mut(store_id)?.del_rec(rec_id)?;
        self.dispatch_delete(store_id, rec_id);
        Ok(())
    }

    /// Adds a join edge, performing the symmetric write on the inverse
    /// join's store when one is wired (`spec.md` §4.4's "atomically").
    pub fn add_join(&mut self, store_id: StoreId, join_id: JoinId, rec_id: RecId, target_id: RecId, freq: i64) -> Result<()> {
        self.wal.append(Operation::AddJoin { store: store_id, rec_id, join: join_id, target: target_id, freq })?;
        self.add_join_inner(store_id, join_id, rec_id, target_id, freq)
    }

    fn add_join_inner(&mut self, store_id: StoreId, join_id: JoinId, rec_id: RecId, target_id: RecId, freq: i64) -> Result<()> {
        let join = self.store(store_id)?.schema().join(join_id)?.clone();
        self.write_join_side(store_id, &join, rec_id, target_id, freq)?;

        if let Some(inv_id) = join.inverse_join_id {
            let inv_join = self.store(join.join_store_id)?.schema().join(inv_id)?.clone();
            self.write_join_side(join.join_store_id, &inv_join, target_id, rec_id, freq)?;
        }
        Ok(())
    }

    pub fn del_join(&mut self, store_id: StoreId, join_id: JoinId, rec_id: RecId, target_id: RecId) -> Result<()> {
        self.wal.append(Operation::DelJoin { store: store_id, rec_id, join: join_id, target: target_id })?;
        self.del_join_inner(store_id, join_id, rec_id, target_id)
    }

    fn del_join_inner(&mut self, store_id: StoreId, join_id: JoinId, rec_id: RecId, target_id: RecId) -> Result<()> {
        let join = self.store(store_id)?.schema().join(join_id)?.clone();
        if join.kind == JoinKind::Index {
            let key_id = join.join_key_id.unwrap();
            self.gix.del(key_id, WordId(rec_id.0), target_id)?;
        }
        self.store_mut(store_id)?.del_join(rec_id, join_id)?;

        if let Some(inv_id) = join.inverse_join_id {
            let inv_join = self.store(join.join_store_id)?.schema().join(inv_id)?.clone();
            if inv_join.kind == JoinKind::Index {
                let key_id = inv_join.join_key_id.unwrap();
                self.gix.del(key_id, WordId(target_id.0), rec_id)?;
            }
            self.store_mut(join.join_store_id)?.del_join(target_id, inv_id)?;
        }
        Ok(())
    }

    fn write_join_side(&mut self, store_id: StoreId, join: &JoinDesc, rec_id: RecId, target_id: RecId, freq: i64) -> Result<()> {
        if join.kind == JoinKind::Index {
            let key_id = join.join_key_id.unwrap();
            self.gix.add(key_id, WordId(rec_id.0), target_id, freq)?;
        }
        self.store_mut(store_id)?.add_join(rec_id, join.join_id, target_id, freq)
    }

    // ---- queries -------------------------------------------------

    pub fn search(&mut self, query_json: &Value) -> Result<RecordSet> {
        let query: Query = parse_query(query_json, &*self)?;
        let mut executor = Executor::new(self);
        executor.execute(&query)
    }

    /// k-nearest-neighbour geo search (`spec.md` §4.3's `nn`), exposed
    /// directly since the `$location` query surface only ever builds a
    /// `range` leaf (§4.7's `Geo` node takes `RadiusMeters | None`, and
    /// the JSON grammar has no "no radius" spelling of its own).
    pub fn geo_nn(&self, store_id: StoreId, key_name: &str, lat: f64, lon: f64, limit: usize) -> Result<Vec<RecId>> {
        let key = self.store(store_id)?.schema().key_by_name(key_name)?;
        let geo = ExecutionContext::geo_index(self, key.key_id)?;
        Ok(geo.nn(lat, lon, limit))
    }

    pub fn get_rec_json(&self, store_id: StoreId, rec_id: RecId) -> Result<Value> {
        crate::store::Record::by_ref(store_id, rec_id).to_json(self.store(store_id)?)
    }

    pub fn print_types(&self, store_id: StoreId) -> Result<String> {
        Ok(self.store(store_id)?.print_types())
    }

    pub fn print_all(&self, store_id: StoreId) -> Result<String> {
        Ok(self.store(store_id)?.print_all())
    }

    // ---- accessors -------------------------------------------------

    pub fn store(&self, store_id: StoreId) -> Result<&Store> {
        self.stores.get(&store_id).ok_or_else(|| Error::new(ErrorKind::UnknownStore, format!("store id {:?}", store_id)))
    }

    pub fn store_mut(&mut self, store_id: StoreId) -> Result<&mut Store> {
        self.stores.get_mut(&store_id).ok_or_else(|| Error::new(ErrorKind::UnknownStore, format!("store id {:?}", store_id)))
    }

    pub fn store_id_by_name(&self, name: &str) -> Result<StoreId> {
        self.store_name_to_id.get(name).copied().ok_or_else(|| Error::new(ErrorKind::UnknownStore, name.to_string()))
    }

    pub fn schema(&self, store_id: StoreId) -> Result<&StoreSchema> {
        Ok(self.store(store_id)?.schema())
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    // ---- index maintenance ----------------------------------------

    fn index_record(&mut self, store_id: StoreId, rec_id: RecId) -> Result<()> {
        let keys: Vec<IndexKey> = self.store(store_id)?.schema().keys().iter().filter(|k| !k.is_internal()).cloned().collect();
        for key in &keys {
            self.index_key(store_id, rec_id, key)?;
        }
        Ok(())
    }

    fn deindex_record(&mut self, store_id: StoreId, rec_id: RecId) -> Result<()> {
        let keys: Vec<IndexKey> = self.store(store_id)?.schema().keys().iter().filter(|k| !k.is_internal()).cloned().collect();
        for key in &keys {
            self.deindex_key(store_id, rec_id, key)?;
        }
        Ok(())
    }

    fn index_key(&mut self, store_id: StoreId, rec_id: RecId, key: &IndexKey) -> Result<()> {
        let value = self.store(store_id)?.get_field(rec_id, key.field_id)?;
        if key.kind == KeyKind::Location {
            if let FieldValue::FltPair(lat, lon) = value {
                self.geo_indexes
                    .get_mut(&key.key_id)
                    .ok_or_else(|| Error::new(ErrorKind::GeoIndexAbsent, format!("no geo index for key '{}'", key.name)))?
                    .add(lat, lon, rec_id);
            }
            return Ok(());
        }
        for (word, freq) in self.index_words(key, &value)? {
            let word_id = self.index_voc.add_word(key.key_id, &word)?;
            self.gix.add(key.key_id, word_id, rec_id, freq)?;
        }
        Ok(())
    }

    fn deindex_key(&mut self, store_id: StoreId, rec_id: RecId, key: &IndexKey) -> Result<()> {
        let value = self.store(store_id)?.get_field(rec_id, key.field_id)?;
        if key.kind == KeyKind::Location {
            if let FieldValue::FltPair(lat, lon) = value {
                if let Some(geo) = self.geo_indexes.get_mut(&key.key_id) {
                    geo.del(lat, lon, rec_id);
                }
            }
            return Ok(());
        }
        for (word, _) in self.index_words(key, &value)? {
            if let Some(word_id) = self.index_voc.lookup_word(key.key_id, &word)? {
                self.gix.del(key.key_id, word_id, rec_id)?;
            }
        }
        Ok(())
    }

    /// Splits a field value into the (word, freq) pairs a `Value`/`Text`
    /// key indexes it under. Value keys index one word per scalar (or
    /// one per element of a sequence); text keys tokenize through the
    /// key's declared analyzer and count term frequency.
    fn index_words(&self, key: &IndexKey, value: &FieldValue) -> Result<Vec<(String, i64)>> {
        match key.kind {
            KeyKind::Value => Ok(scalar_words(value).into_iter().map(|w| (w, 1)).collect()),
            KeyKind::Text => {
                let text = match value {
                    FieldValue::Str(s) => s.as_str(),
                    FieldValue::Null => return Ok(Vec::new()),
                    other => return Err(Error::new(ErrorKind::TypeMismatch, format!("text key '{}' needs a Str field, found {}", key.name, other.type_name()))),
                };
                let tokenizer = key.tokenizer.as_deref().unwrap_or("standard");
                let tokens = self.analyzers.analyze(tokenizer, text)?;
                let mut counts: HashMap<String, i64> = HashMap::new();
                for token in tokens {
                    *counts.entry(token.text).or_insert(0) += 1;
                }
                Ok(counts.into_iter().collect())
            }
            KeyKind::Location | KeyKind::Internal => Ok(Vec::new()),
        }
    }

    fn range_words(&self, key_id: KeyId, from: Option<&str>, to: Option<&str>) -> Result<Vec<WordId>> {
        let key = self.keys.get(&key_id).ok_or_else(|| Error::new(ErrorKind::UnknownKey, format!("key id {:?}", key_id)))?;
        let voc = self.index_voc.word_voc(key_id)?;

        let mut acc: Option<std::collections::HashSet<WordId>> = None;
        if let Some(f) = from {
            let ids = self.bound_words(voc, key.sort_type, f, true)?;
            acc = Some(ids.into_iter().collect());
        }
        if let Some(t) = to {
            let ids: std::collections::HashSet<WordId> = self.bound_words(voc, key.sort_type, t, false)?.into_iter().collect();
            acc = Some(match acc {
                Some(existing) => existing.intersection(&ids).copied().collect(),
                None => ids,
            });
        }
        Ok(acc.unwrap_or_default().into_iter().collect())
    }

    fn bound_words(&self, voc: &crate::vocab::WordVoc, sort: SortType, literal: &str, greater: bool) -> Result<Vec<WordId>> {
        match voc.lookup_exact(literal) {
            Some(id) => {
                if greater {
                    voc.greater_than(id, sort)
                } else {
                    voc.less_than(id, sort)
                }
            }
            None => match self.config.oov_range_policy {
                OovRangePolicy::Error => Err(Error::new(ErrorKind::UnorderedLeaf, format!("literal '{}' is not in the key's vocabulary", literal))),
                OovRangePolicy::ClipToNearest => self.clip_bound(voc, sort, literal, greater),
            },
        }
    }

    /// An out-of-vocabulary bound under `ClipToNearest` behaves as if
    /// the literal were inserted and then immediately queried against:
    /// every word is compared directly rather than pivoted off an
    /// existing id.
    fn clip_bound(&self, voc: &crate::vocab::WordVoc, sort: SortType, literal: &str, greater: bool) -> Result<Vec<WordId>> {
        match sort {
            SortType::None => Err(Error::new(ErrorKind::InvalidSortType, "key has no declared sort order")),
            SortType::ById => Err(Error::new(ErrorKind::UnorderedLeaf, "ById ordering has no numeric clip target")),
            SortType::ByStr => {
                let ids = (0..voc.len() as u64)
                    .map(WordId)
                    .filter(|&id| {
                        let w = voc.word(id).unwrap_or("");
                        if greater { w > literal } else { w < literal }
                    })
                    .collect();
                Ok(ids)
            }
            SortType::ByFlt => {
                let target: f64 = literal.parse().map_err(|_| Error::new(ErrorKind::UnorderedLeaf, "clip bound literal is not numeric"))?;
                let ids = (0..voc.len() as u64)
                    .map(WordId)
                    .filter(|&id| {
                        voc.word(id).and_then(|w| w.parse::<f64>().ok()).map_or(false, |v| if greater { v > target } else { v < target })
                    })
                    .collect();
                Ok(ids)
            }
        }
    }

    fn tokenize_words(&self, key_id: KeyId, text: &str) -> Result<Vec<String>> {
        let key = self.keys.get(&key_id).ok_or_else(|| Error::new(ErrorKind::UnknownKey, format!("key id {:?}", key_id)))?;
        let tokenizer = key.tokenizer.as_deref().unwrap_or("standard");
        Ok(self.analyzers.analyze(tokenizer, text)?.into_iter().map(|t| t.text).collect())
    }

    // ---- stream-aggregate dispatch ---------------------------------

    fn dispatch_add(&mut self, store_id: StoreId, rec_id: RecId) {
        let Some(store) = self.stores.get(&store_id) else { return };
        if let Some(aggr_base) = self.stream_aggr_bases.get_mut(&store_id) {
            if let Err(e) = crate::store::Trigger::on_add_rec(aggr_base, store, rec_id) {
                self.logger.error(&format!("stream aggregate base for store {:?} failed on add: {}", store_id, e));
            }
        }
    }

    fn dispatch_update(&mut self, store_id: StoreId, rec_id: RecId) {
        let Some(store) = self.stores.get(&store_id) else { return };
        if let Some(aggr_base) = self.stream_aggr_bases.get_mut(&store_id) {
            if let Err(e) = crate::store::Trigger::on_update_rec(aggr_base, store, rec_id) {
                self.logger.error(&format!("stream aggregate base for store {:?} failed on update: {}", store_id, e));
            }
        }
    }

    fn dispatch_delete(&mut self, store_id: StoreId, rec_id: RecId) {
        let Some(store) = self.stores.get(&store_id) else { return };
        if let Some(aggr_base) = self.stream_aggr_bases.get_mut(&store_id) {
            if let Err(e) = crate::store::Trigger::on_delete_rec(aggr_base, store, rec_id) {
                self.logger.error(&format!("stream aggregate base for store {:?} failed on delete: {}", store_id, e));
            }
        }
    }

    // ---- persistence -------------------------------------------------

    fn save_schema(&self) -> Result<()> {
        let mut stores: Vec<StoreSchema> = self.store_ids().into_iter().map(|id| self.stores[&id].schema().clone()).collect();
        stores.sort_by_key(|s| s.store_id);
        let persisted = PersistedSchema { stores, next_store_id: self.next_store_id };
        std::fs::write(self.layout.schema_path(), bincode::serialize(&persisted)?)?;
        Ok(())
    }

    fn load_schema(&mut self) -> Result<()> {
        let bytes = std::fs::read(self.layout.schema_path())?;
        let persisted: PersistedSchema = bincode::deserialize(&bytes)?;
        self.next_store_id = persisted.next_store_id;
        for schema in persisted.stores {
            let store_id = schema.store_id;
            self.store_name_to_id.insert(schema.store_name.clone(), store_id);
            for key in schema.keys() {
                self.keys.insert(key.key_id, key.clone());
                if key.kind == KeyKind::Location {
                    self.geo_indexes.entry(key.key_id).or_insert_with(|| GeoIndex::new(self.config.geo_precision));
                }
            }
            self.stream_aggr_bases.insert(store_id, StreamAggrBase::new(schema.store_name.clone()));
            self.stores.insert(store_id, Store::new(schema));
        }
        Ok(())
    }

    fn save_index_voc(&self) -> Result<()> {
        std::fs::write(self.layout.index_voc_path(), bincode::serialize(&self.index_voc)?)?;
        Ok(())
    }

    fn load_index_voc(&mut self) -> Result<()> {
        let bytes = std::fs::read(self.layout.index_voc_path())?;
        self.index_voc = bincode::deserialize(&bytes)?;
        Ok(())
    }

    fn save_geo_indexes(&self) -> Result<()> {
        std::fs::write(self.layout.geo_index_path(), bincode::serialize(&self.geo_indexes)?)?;
        Ok(())
    }

    fn load_geo_indexes(&mut self) -> Result<()> {
        let bytes = std::fs::read(self.layout.geo_index_path())?;
        self.geo_indexes = bincode::deserialize(&bytes)?;
        Ok(())
    }

    /// Writes one snapshot segment per store, sequence 0 — overwritten
    /// wholesale on every close (`spec.md` §9's "temp index merged at
    /// close" pattern, applied to row storage instead of Gix).
    fn flush_store_rows(&self) -> Result<()> {
        for store_id in self.store_ids() {
            let store = &self.stores[&store_id];
            let mut writer = SegmentWriter::new(&self.layout, store_id, SegmentId::new(), 0)?;
            for rec_id in store.get_all_recs() {
                let mut fields = Vec::new();
                for field in store.schema().fields() {
                    fields.push((field.field_id, store.get_field(rec_id, field.field_id)?));
                }
                writer.write_row(&StoredRow { rec_id, deleted: false, fields })?;
            }
            writer.finish()?;
        }
        Ok(())
    }

    fn reload_store_rows(&mut self) -> Result<()> {
        for store_id in self.store_ids() {
            let path = self.layout.store_segment_path(store_id, 0);
            if !path.exists() {
                continue;
            }
            let mut reader = SegmentReader::open(&self.layout, store_id, 0)?;
            let rows = reader.read_all_rows()?;
            let store = self.stores.get_mut(&store_id).unwrap();
            for row in rows {
                store.restore_row(row.rec_id, row.fields);
            }
        }
        Ok(())
    }
}

impl ExecutionContext for Base {
    fn store(&self, store_id: StoreId) -> Result<&Store> {
        self.store(store_id)
    }

    fn key_by_name(&self, store_id: StoreId, name: &str) -> Result<&IndexKey> {
        self.store(store_id)?.schema().key_by_name(name)
    }

    fn lookup_word(&self, key_id: KeyId, text: &str) -> Option<WordId> {
        self.index_voc.lookup_word(key_id, text).ok().flatten()
    }

    fn wildcard_words(&self, key_id: KeyId, pattern: &str) -> Result<Vec<WordId>> {
        self.index_voc.word_voc(key_id)?.lookup_wildcard(pattern)
    }

    fn range_words(&self, key_id: KeyId, from: Option<&str>, to: Option<&str>) -> Result<Vec<WordId>> {
        self.range_words(key_id, from, to)
    }

    fn gix_mut(&mut self) -> &mut Gix {
        &mut self.gix
    }

    fn geo_index(&self, key_id: KeyId) -> Result<&GeoIndex> {
        self.geo_indexes.get(&key_id).ok_or_else(|| Error::new(ErrorKind::GeoIndexAbsent, format!("no geo index for key {:?}", key_id)))
    }

    fn tokenize(&self, key_id: KeyId, text: &str) -> Vec<String> {
        self.tokenize_words(key_id, text).unwrap_or_default()
    }
}

impl SchemaLookup for Base {
    fn store_id_by_name(&self, name: &str) -> Result<StoreId> {
        self.store_id_by_name(name)
    }

    fn schema(&self, store_id: StoreId) -> Result<&StoreSchema> {
        self.schema(store_id)
    }
}

fn scalar_words(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::Null => Vec::new(),
        FieldValue::Int(v) => vec![v.to_string()],
        FieldValue::UInt64(v) => vec![v.to_string()],
        FieldValue::Str(v) => vec![v.clone()],
        FieldValue::Bool(v) => vec![v.to_string()],
        FieldValue::Flt(v) => vec![v.to_string()],
        FieldValue::Timestamp(v) => vec![v.to_rfc3339()],
        FieldValue::IntSeq(vs) => vs.iter().map(|v| v.to_string()).collect(),
        FieldValue::StrSeq(vs) => vs.clone(),
        FieldValue::FltSeq(vs) => vs.iter().map(|v| v.to_string()).collect(),
        FieldValue::FltPair(..) | FieldValue::NumericSparse(_) | FieldValue::BowSparse(_) => Vec::new(),
    }
}

/// Converts one JSON value into a `FieldValue` for `field_type`, per
/// the table in `spec.md` §6 (the inverse of `FieldValue::to_json`).
fn field_value_from_json(field_type: FieldType, json: &Value) -> Result<FieldValue> {
    if json.is_null() {
        return Ok(FieldValue::Null);
    }
    let bad = || Error::new(ErrorKind::TypeMismatch, format!("value {} does not match field type {:?}", json, field_type));
    match field_type {
        FieldType::Int => json.as_i64().map(FieldValue::Int).ok_or_else(bad),
        FieldType::UInt64 => json.as_u64().map(FieldValue::UInt64).ok_or_else(bad),
        FieldType::Bool => json.as_bool().map(FieldValue::Bool).ok_or_else(bad),
        FieldType::Float => json.as_f64().map(FieldValue::Flt).ok_or_else(bad),
        FieldType::String => json.as_str().map(|s| FieldValue::Str(s.to_string())).ok_or_else(bad),
        FieldType::Datetime => json
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| FieldValue::Timestamp(dt.with_timezone(&chrono::Utc)))
            .ok_or_else(bad),
        FieldType::IntV => json.as_array().map(|a| a.iter().filter_map(Value::as_i64).collect()).map(FieldValue::IntSeq).ok_or_else(bad),
        FieldType::StringV => json
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .map(FieldValue::StrSeq)
            .ok_or_else(bad),
        FieldType::FloatV => json.as_array().map(|a| a.iter().filter_map(Value::as_f64).collect()).map(FieldValue::FltSeq).ok_or_else(bad),
        FieldType::FloatPair => {
            let arr = json.as_array().ok_or_else(bad)?;
            let lat = arr.first().and_then(Value::as_f64).ok_or_else(bad)?;
            let lon = arr.get(1).and_then(Value::as_f64).ok_or_else(bad)?;
            Ok(FieldValue::FltPair(lat, lon))
        }
        FieldType::NumSpV => {
            let s = json.as_str().ok_or_else(bad)?;
            let mut pairs = Vec::new();
            for part in s.split_whitespace() {
                let (idx, val) = part.split_once(':').ok_or_else(bad)?;
                pairs.push((idx.parse::<u64>().map_err(|_| bad())?, val.parse::<f64>().map_err(|_| bad())?));
            }
            Ok(FieldValue::NumericSparse(pairs))
        }
        FieldType::BowSpV => Ok(FieldValue::BowSparse(Vec::new())),
    }
}

fn default_operators() -> HashMap<String, OperatorKind> {
    let mut m = HashMap::new();
    m.insert("linsearch".to_string(), OperatorKind::LinSearch);
    m.insert("groupby".to_string(), OperatorKind::GroupBy);
    m.insert("splitby".to_string(), OperatorKind::SplitBy);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OpenMode;
    use serde_json::json;
    use tempfile::tempdir;

    fn open_base(dir: &std::path::Path) -> Base {
        let mut config = Config::default();
        config.storage_path = dir.to_path_buf();
        config.open_mode = OpenMode::Create;
        Base::open(config).unwrap()
    }

    #[test]
    fn define_and_add_then_range_query() {
        let dir = tempdir().unwrap();
        let mut base = open_base(dir.path());

        let people = base.create_store("people").unwrap();
        let name_f = base.add_field(people, "name", FieldType::String).unwrap();
        let age_f = base.add_field(people, "age", FieldType::Int).unwrap();
        base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();
        base.add_value_key(people, "age", age_f, SortType::ByFlt).unwrap();

        base.add_rec(people, &json!({"name": "Ada", "age": 36})).unwrap();
        base.add_rec(people, &json!({"name": "Bob", "age": 17})).unwrap();

        assert_eq!(base.store(people).unwrap().len(), 2);

        let result = base.search(&json!({"$from": "people", "age": {"$gt": "17"}})).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn not_all_excludes_matched_record() {
        let dir = tempdir().unwrap();
        let mut base = open_base(dir.path());

        let people = base.create_store("people").unwrap();
        let name_f = base.add_field(people, "name", FieldType::String).unwrap();
        base.add_field(people, "age", FieldType::Int).unwrap();
        base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();

        base.add_rec(people, &json!({"name": "Ada", "age": 36})).unwrap();
        base.add_rec(people, &json!({"name": "Bob", "age": 17})).unwrap();

        let result = base.search(&json!({"$from": "people", "$not": {"name": "Ada"}})).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn index_join_wires_both_directions() {
        let dir = tempdir().unwrap();
        let mut base = open_base(dir.path());

        let authors = base.create_store("authors").unwrap();
        let author_name = base.add_field(authors, "name", FieldType::String).unwrap();
        base.add_value_key(authors, "name", author_name, SortType::ByStr).unwrap();

        let books = base.create_store("books").unwrap();
        let title_f = base.add_field(books, "title", FieldType::String).unwrap();
        base.add_field(books, "year", FieldType::Int).unwrap();
        base.add_value_key(books, "title", title_f, SortType::ByStr).unwrap();

        let wrote = base.define_join(authors, "wrote", books, JoinSpec::Index).unwrap();
        let authors_of = base.define_join(books, "authors", authors, JoinSpec::Index).unwrap();
        base.link_inverse(authors, wrote, books, authors_of).unwrap();

        base.add_rec(authors, &json!({"name": "Ada", "wrote": [{"title": "X", "year": 2001}]})).unwrap();

        let ada = base.search(&json!({"$from": "authors", "name": "Ada"})).unwrap();
        assert_eq!(ada.len(), 1);
        let ada_id = ada.rec_ids()[0];

        let joined = {
            let store = base.stores.get(&authors).unwrap();
            let target = base.stores.get(&books).unwrap();
            let rs = RecordSet::from_raw(authors, vec![(ada_id, 1)]);
            rs.do_join(store, target, "wrote", &mut base.gix).unwrap()
        };
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn delete_then_reinsert_reuses_record_id() {
        let dir = tempdir().unwrap();
        let mut base = open_base(dir.path());
        let people = base.create_store("people").unwrap();
        let name_f = base.add_field(people, "name", FieldType::String).unwrap();
        base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();

        let ada = base.add_rec(people, &json!({"name": "Ada"})).unwrap();
        base.del_rec(people, ada).unwrap();
        assert!(base.store(people).unwrap().get_field(ada, name_f).is_err());

        let again = base.add_rec(people, &json!({"name": "Bob"})).unwrap();
        assert_eq!(ada, again);
    }

    #[test]
    fn close_then_reopen_preserves_rows_and_index() {
        let dir = tempdir().unwrap();
        {
            let mut base = open_base(dir.path());
            let people = base.create_store("people").unwrap();
            let name_f = base.add_field(people, "name", FieldType::String).unwrap();
            base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();
            base.add_rec(people, &json!({"name": "Ada"})).unwrap();
            base.close().unwrap();
        }

        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        config.open_mode = OpenMode::Update;
        let mut base = Base::open(config).unwrap();
        let people = base.store_id_by_name("people").unwrap();
        assert_eq!(base.store(people).unwrap().len(), 1);

        let result = base.search(&json!({"$from": "people", "name": "Ada"})).unwrap();
        assert_eq!(result.len(), 1);
    }
}
