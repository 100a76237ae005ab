use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldId, JoinId, KeyId, StoreId};
use crate::schema::field::{FieldDesc, FieldType};
use crate::schema::join::JoinDesc;
use crate::schema::key::IndexKey;

/// One store's full schema: fields, joins and index keys, plus the
/// name→id lookups the teacher's `core/database.rs` keeps inline.
/// Grounded on `TStore`'s `FieldDescV`/`JoinDescV` pair
/// (`qminer_core.cpp`), split into its own type here since Rust wants
/// the schema and the row storage to be separate owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSchema {
    pub store_id: StoreId,
    pub store_name: String,
    fields: Vec<FieldDesc>,
    joins: Vec<JoinDesc>,
    keys: Vec<IndexKey>,
    field_name_to_id: HashMap<String, FieldId>,
    join_name_to_id: HashMap<String, JoinId>,
    key_name_to_id: HashMap<String, KeyId>,
}

impl StoreSchema {
    pub fn new(store_id: StoreId, store_name: impl Into<String>) -> Self {
        StoreSchema {
            store_id,
            store_name: store_name.into(),
            fields: Vec::new(),
            joins: Vec::new(),
            keys: Vec::new(),
            field_name_to_id: HashMap::new(),
            join_name_to_id: HashMap::new(),
            key_name_to_id: HashMap::new(),
        }
    }

    fn check_name_free(&self, name: &str) -> Result<()> {
        if self.field_name_to_id.contains_key(name) || self.join_name_to_id.contains_key(name) {
            return Err(Error::new(ErrorKind::NameCollision, format!("name '{}' already taken in store '{}'", name, self.store_name)));
        }
        Ok(())
    }

    pub fn add_field(&mut self, name: impl Into<String>, field_type: FieldType) -> Result<FieldId> {
        let name = name.into();
        self.check_name_free(&name)?;
        let field_id = FieldId(self.fields.len() as u16);
        self.fields.push(FieldDesc::new(field_id, name.clone(), field_type));
        self.field_name_to_id.insert(name, field_id);
        Ok(field_id)
    }

    /// Adds a field with both null-allowed and internal flags set
    /// explicitly — used for the hidden `(UInt64, Int)` pair a field-join
    /// allocates on its owning store.
    pub fn add_internal_field(&mut self, name: impl Into<String>, field_type: FieldType) -> Result<FieldId> {
        let name = name.into();
        self.check_name_free(&name)?;
        let field_id = FieldId(self.fields.len() as u16);
        let mut desc = FieldDesc::new(field_id, name.clone(), field_type);
        desc.internal = true;
        self.fields.push(desc);
        self.field_name_to_id.insert(name, field_id);
        Ok(field_id)
    }

    pub fn add_join(&mut self, join: JoinDesc) -> Result<JoinId> {
        self.check_name_free(&join.name)?;
        let join_id = JoinId(self.joins.len() as u16);
        let mut join = join;
        join.join_id = join_id;
        self.join_name_to_id.insert(join.name.clone(), join_id);
        self.joins.push(join);
        Ok(join_id)
    }

    pub fn add_key(&mut self, key: IndexKey) -> Result<KeyId> {
        if self.key_name_to_id.contains_key(&key.name) {
            return Err(Error::new(ErrorKind::NameCollision, format!("key name '{}' already taken", key.name)));
        }
        self.key_name_to_id.insert(key.name.clone(), key.key_id);
        self.keys.push(key);
        Ok(self.keys.last().unwrap().key_id)
    }

    pub fn field(&self, field_id: FieldId) -> Result<&FieldDesc> {
        self.fields.get(field_id.0 as usize).ok_or_else(|| Error::new(ErrorKind::UnknownField, format!("field id {:?}", field_id)))
    }

    pub fn field_by_name(&self, name: &str) -> Result<&FieldDesc> {
        let id = *self.field_name_to_id.get(name).ok_or_else(|| Error::new(ErrorKind::UnknownField, name.to_string()))?;
        self.field(id)
    }

    pub fn join(&self, join_id: JoinId) -> Result<&JoinDesc> {
        self.joins.get(join_id.0 as usize).ok_or_else(|| Error::new(ErrorKind::UnknownJoin, format!("join id {:?}", join_id)))
    }

    pub fn join_mut(&mut self, join_id: JoinId) -> Result<&mut JoinDesc> {
        self.joins.get_mut(join_id.0 as usize).ok_or_else(|| Error::new(ErrorKind::UnknownJoin, format!("join id {:?}", join_id)))
    }

    pub fn join_by_name(&self, name: &str) -> Result<&JoinDesc> {
        let id = *self.join_name_to_id.get(name).ok_or_else(|| Error::new(ErrorKind::UnknownJoin, name.to_string()))?;
        self.join(id)
    }

    pub fn key(&self, key_id: KeyId) -> Result<&IndexKey> {
        self.keys.iter().find(|k| k.key_id == key_id).ok_or_else(|| Error::new(ErrorKind::UnknownKey, format!("key id {:?}", key_id)))
    }

    pub fn key_by_name(&self, name: &str) -> Result<&IndexKey> {
        let id = *self.key_name_to_id.get(name).ok_or_else(|| Error::new(ErrorKind::UnknownKey, name.to_string()))?;
        self.key(id)
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn joins(&self) -> &[JoinDesc] {
        &self.joins
    }

    pub fn keys(&self) -> &[IndexKey] {
        &self.keys
    }
}

/// Wires up inverse joins across two stores' schemas once both exist.
/// A join declared before its target store is registered must be left
/// pending and re-checked — `spec.md` §4.5's `ForwardJoinReference`.
pub fn link_inverse_joins(
    a: &mut StoreSchema,
    a_join: JoinId,
    b: &mut StoreSchema,
    b_join: JoinId,
) -> Result<()> {
    a.join_mut(a_join)?.inverse_join_id = Some(b_join);
    b.join_mut(b_join)?.inverse_join_id = Some(a_join);
    Ok(())
}
