use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldId, FieldValue, JoinId, RecId, StoreId};
use crate::schema::{JoinKind, StoreSchema};
use crate::store::trigger::Trigger;

struct Slot {
    fields: Vec<(FieldId, FieldValue)>,
    /// Set on delete; the slot's storage is kept until compaction so a
    /// stale `RecId` still resolves to a name, distinguishing
    /// `DeletedRecord` from `RecordNotFound`.
    deleted: bool,
}

/// A typed collection of records sharing one schema (`spec.md` §4.4).
/// Grounded on the teacher's `core/database.rs` write pipeline — mutate,
/// then fan the mutation out to triggers — generalized from "documents
/// in a full-text index" to "rows in a field/join schema".
pub struct Store {
    schema: StoreSchema,
    slots: Vec<Option<Slot>>,
    free_list: Vec<u64>,
    triggers: Vec<Box<dyn Trigger>>,
}

impl Store {
    pub fn new(schema: StoreSchema) -> Self {
        Store { schema, slots: Vec::new(), free_list: Vec::new(), triggers: Vec::new() }
    }

    pub fn id(&self) -> StoreId {
        self.schema.store_id
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut StoreSchema {
        &mut self.schema
    }

    pub fn add_trigger(&mut self, trigger: Box<dyn Trigger>) {
        self.triggers.push(trigger);
    }

    pub fn del_trigger(&mut self, name: &str) {
        self.triggers.retain(|t| t.name() != name);
    }

    /// Validates every declared field against the supplied values,
    /// allocates a `RecId` (reusing a freed slot when one is available),
    /// fills any field-join hidden fields to `(Mx, 0)`, and fans the
    /// mutation out to every trigger.
    pub fn add_rec(&mut self, mut fields: Vec<(FieldId, FieldValue)>) -> Result<RecId> {
        for field in self.schema.fields() {
            if field.internal {
                continue;
            }
            let value = fields.iter().find(|(id, _)| *id == field.field_id).map(|(_, v)| v);
            match value {
                Some(v) => field.check_value(v)?,
                None if field.null_allowed => {}
                None => return Err(Error::new(ErrorKind::NullViolation, format!("field '{}' is required", field.name))),
            }
        }

        for join in self.schema.joins() {
            if join.is_field_join() {
                let rec_field = join.field_rec_id.unwrap();
                let fq_field = join.field_freq.unwrap();
                if !fields.iter().any(|(id, _)| *id == rec_field) {
                    fields.push((rec_field, FieldValue::UInt64(u64::MAX)));
                    fields.push((fq_field, FieldValue::Int(0)));
                }
            }
        }

        let rec_id = self.alloc_slot(fields);
        self.fire_on_add(rec_id)?;
        Ok(rec_id)
    }

    /// Places `fields` directly at `rec_id`'s slot, extending the slot
    /// table with vacant gaps as needed. Used only when reloading a
    /// store's rows from a segment on `Base::open` — bypasses
    /// validation and triggers since the record already went through
    /// both the first time it was written.
    pub fn restore_row(&mut self, rec_id: RecId, fields: Vec<(FieldId, FieldValue)>) {
        let idx = rec_id.0 as usize;
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(Slot { fields, deleted: false });
    }

    /// Like [`Store::add_rec`], but places the row at a caller-chosen
    /// `rec_id` instead of allocating one. Used by write-ahead-log
    /// replay, where the id was already assigned before a crash.
    pub fn add_rec_at(&mut self, rec_id: RecId, fields: Vec<(FieldId, FieldValue)>) -> Result<()> {
        let idx = rec_id.0 as usize;
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(Slot { fields, deleted: false });
        self.free_list.retain(|&id| id != rec_id.0);
        self.fire_on_add(rec_id)
    }

    fn alloc_slot(&mut self, fields: Vec<(FieldId, FieldValue)>) -> RecId {
        let slot = Some(Slot { fields, deleted: false });
        if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = slot;
            RecId(idx)
        } else {
            let idx = self.slots.len() as u64;
            self.slots.push(slot);
            RecId(idx)
        }
    }

    fn slot(&self, rec_id: RecId) -> Result<&Slot> {
        match self.slots.get(rec_id.0 as usize) {
            Some(Some(slot)) if !slot.deleted => Ok(slot),
            Some(Some(_)) => Err(Error::new(ErrorKind::DeletedRecord, format!("record {} was deleted", rec_id.0))),
            _ => Err(Error::new(ErrorKind::RecordNotFound, format!("record {} does not exist", rec_id.0))),
        }
    }

    fn slot_mut(&mut self, rec_id: RecId) -> Result<&mut Slot> {
        match self.slots.get_mut(rec_id.0 as usize) {
            Some(Some(slot)) if !slot.deleted => Ok(slot),
            Some(Some(_)) => Err(Error::new(ErrorKind::DeletedRecord, format!("record {} was deleted", rec_id.0))),
            _ => Err(Error::new(ErrorKind::RecordNotFound, format!("record {} does not exist", rec_id.0))),
        }
    }

    pub fn get_field(&self, rec_id: RecId, field_id: FieldId) -> Result<FieldValue> {
        let slot = self.slot(rec_id)?;
        Ok(slot.fields.iter().find(|(id, _)| *id == field_id).map(|(_, v)| v.clone()).unwrap_or(FieldValue::Null))
    }

    pub fn get_field_int(&self, rec_id: RecId, field_id: FieldId) -> Result<i64> {
        self.get_field(rec_id, field_id)?.as_int()
    }

    pub fn get_field_str(&self, rec_id: RecId, field_id: FieldId) -> Result<String> {
        self.get_field(rec_id, field_id)?.as_str().map(str::to_owned)
    }

    pub fn get_field_flt(&self, rec_id: RecId, field_id: FieldId) -> Result<f64> {
        self.get_field(rec_id, field_id)?.as_flt()
    }

    pub fn set_field(&mut self, rec_id: RecId, field_id: FieldId, value: FieldValue) -> Result<()> {
        self.schema.field(field_id)?.check_value(&value)?;
        let slot = self.slot_mut(rec_id)?;
        if let Some(entry) = slot.fields.iter_mut().find(|(id, _)| *id == field_id) {
            entry.1 = value;
        } else {
            slot.fields.push((field_id, value));
        }
        self.fire_on_update(rec_id)
    }

    pub fn del_rec(&mut self, rec_id: RecId) -> Result<()> {
        self.slot_mut(rec_id)?.deleted = true;
        self.fire_on_delete(rec_id)?;
        self.free_list.push(rec_id.0);
        Ok(())
    }

    /// Adds a join edge from `rec_id` to `target`. Field-joins overwrite
    /// the hidden `(target, freq)` pair outright; index-joins accumulate
    /// `freq` through the caller's Gix write (the store only validates
    /// shape here — Gix/geo mutation is driven by the trigger fan-out,
    /// per `spec.md` §9's mixed-responsibility note).
    pub fn add_join(&mut self, rec_id: RecId, join_id: JoinId, target: RecId, freq: i64) -> Result<()> {
        let join = self.schema.join(join_id)?.clone();
        match join.kind {
            JoinKind::Field => {
                self.set_field(rec_id, join.field_rec_id.unwrap(), FieldValue::UInt64(target.0))?;
                self.set_field(rec_id, join.field_freq.unwrap(), FieldValue::Int(freq))?;
            }
            JoinKind::Index => {
                self.fire_on_update(rec_id)?;
            }
        }
        Ok(())
    }

    pub fn del_join(&mut self, rec_id: RecId, join_id: JoinId) -> Result<()> {
        let join = self.schema.join(join_id)?.clone();
        if join.kind == JoinKind::Field {
            self.set_field(rec_id, join.field_rec_id.unwrap(), FieldValue::UInt64(u64::MAX))?;
            self.set_field(rec_id, join.field_freq.unwrap(), FieldValue::Int(0))?;
        } else {
            self.fire_on_update(rec_id)?;
        }
        Ok(())
    }

    pub fn get_iter(&self) -> impl Iterator<Item = RecId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Some(slot) if !slot.deleted => Some(RecId(i as u64)),
            _ => None,
        })
    }

    pub fn get_all_recs(&self) -> Vec<RecId> {
        self.get_iter().collect()
    }

    pub fn get_rnd_recs(&self, count: usize) -> Vec<RecId> {
        let mut all = self.get_all_recs();
        all.shuffle(&mut thread_rng());
        all.truncate(count);
        all
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn print_types(&self) -> String {
        let mut out = format!("store '{}':\n", self.schema.store_name);
        for field in self.schema.fields() {
            if !field.internal {
                out.push_str(&format!("  {} : {:?}\n", field.name, field.field_type));
            }
        }
        for join in self.schema.joins() {
            out.push_str(&format!("  ->{} (store {:?})\n", join.name, join.join_store_id));
        }
        out
    }

    pub fn print_all(&self) -> String {
        let mut out = String::new();
        for rec_id in self.get_all_recs() {
            out.push_str(&self.print_rec(rec_id));
            out.push('\n');
        }
        out
    }

    pub fn print_rec(&self, rec_id: RecId) -> String {
        match self.slot(rec_id) {
            Ok(slot) => {
                let fields: Vec<String> = slot
                    .fields
                    .iter()
                    .filter(|(id, _)| !self.schema.field(*id).map(|f| f.internal).unwrap_or(false))
                    .map(|(id, v)| format!("{}={:?}", self.schema.field(*id).map(|f| f.name.as_str()).unwrap_or("?"), v))
                    .collect();
                format!("#{}: {}", rec_id.0, fields.join(", "))
            }
            Err(e) => format!("#{}: <{}>", rec_id.0, e),
        }
    }

    fn fire_on_add(&mut self, rec_id: RecId) -> Result<()> {
        let mut triggers = std::mem::take(&mut self.triggers);
        for t in triggers.iter_mut() {
            if let Err(e) = t.on_add_rec(self, rec_id) {
                eprintln!("[warn] trigger '{}' on_add_rec failed for rec {}: {}", t.name(), rec_id.0, e);
            }
        }
        self.triggers = triggers;
        Ok(())
    }

    fn fire_on_update(&mut self, rec_id: RecId) -> Result<()> {
        let mut triggers = std::mem::take(&mut self.triggers);
        for t in triggers.iter_mut() {
            if let Err(e) = t.on_update_rec(self, rec_id) {
                eprintln!("[warn] trigger '{}' on_update_rec failed for rec {}: {}", t.name(), rec_id.0, e);
            }
        }
        self.triggers = triggers;
        Ok(())
    }

    fn fire_on_delete(&mut self, rec_id: RecId) -> Result<()> {
        let mut triggers = std::mem::take(&mut self.triggers);
        for t in triggers.iter_mut() {
            if let Err(e) = t.on_delete_rec(self, rec_id) {
                eprintln!("[warn] trigger '{}' on_delete_rec failed for rec {}: {}", t.name(), rec_id.0, e);
            }
        }
        self.triggers = triggers;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StoreId;
    use crate::schema::FieldType;

    fn store() -> Store {
        let mut schema = StoreSchema::new(StoreId(0), "people");
        schema.add_field("name", FieldType::String).unwrap();
        Store::new(schema)
    }

    #[test]
    fn add_then_get_field() {
        let mut s = store();
        let name_id = s.schema().field_by_name("name").unwrap().field_id;
        let rec = s.add_rec(vec![(name_id, FieldValue::Str("alice".into()))]).unwrap();
        assert_eq!(s.get_field_str(rec, name_id).unwrap(), "alice");
    }

    #[test]
    fn deleted_record_is_distinguished_from_missing() {
        let mut s = store();
        let name_id = s.schema().field_by_name("name").unwrap().field_id;
        let rec = s.add_rec(vec![(name_id, FieldValue::Str("bob".into()))]).unwrap();
        s.del_rec(rec).unwrap();

        let err = s.get_field(rec, name_id).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeletedRecord);

        let err = s.get_field(RecId(999), name_id).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecordNotFound);
    }

    #[test]
    fn deleted_slot_is_reused() {
        let mut s = store();
        let name_id = s.schema().field_by_name("name").unwrap().field_id;
        let rec1 = s.add_rec(vec![(name_id, FieldValue::Str("a".into()))]).unwrap();
        s.del_rec(rec1).unwrap();
        let rec2 = s.add_rec(vec![(name_id, FieldValue::Str("b".into()))]).unwrap();
        assert_eq!(rec1, rec2);
    }
}
