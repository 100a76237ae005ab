use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldId, FieldValue, RecId, StoreId};

/// A row as held in `Store`. By-reference records (the default — see
/// `spec.md` §4.6) just point back at the store's own table; by-value
/// records carry a snapshot and can outlive the store or cross a
/// serialization boundary on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub store_id: StoreId,
    pub rec_id: RecId,
    repr: RecordRepr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum RecordRepr {
    ByRef,
    ByValue(Vec<(FieldId, FieldValue)>),
}

impl Record {
    pub fn by_ref(store_id: StoreId, rec_id: RecId) -> Self {
        Record { store_id, rec_id, repr: RecordRepr::ByRef }
    }

    pub fn by_value(store_id: StoreId, rec_id: RecId, fields: Vec<(FieldId, FieldValue)>) -> Self {
        Record { store_id, rec_id, repr: RecordRepr::ByValue(fields) }
    }

    pub fn is_by_value(&self) -> bool {
        matches!(self.repr, RecordRepr::ByValue(_))
    }

    /// Resolves a field's value, either from the snapshot (by-value) or
    /// by asking back into the live store (by-ref).
    pub fn field<'a>(&'a self, store: &'a crate::store::store::Store, field_id: FieldId) -> Result<std::borrow::Cow<'a, FieldValue>> {
        match &self.repr {
            RecordRepr::ByValue(fields) => fields
                .iter()
                .find(|(id, _)| *id == field_id)
                .map(|(_, v)| std::borrow::Cow::Borrowed(v))
                .ok_or_else(|| Error::new(ErrorKind::UnknownField, format!("field id {:?}", field_id))),
            RecordRepr::ByRef => store.get_field(self.rec_id, field_id).map(std::borrow::Cow::Owned),
        }
    }

    pub fn to_json(&self, store: &crate::store::store::Store) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("$id".to_string(), serde_json::json!(self.rec_id.0));
        for field in store.schema().fields() {
            if field.internal {
                continue;
            }
            let value = self.field(store, field.field_id)?;
            map.insert(field.name.clone(), value.to_json());
        }
        Ok(serde_json::Value::Object(map))
    }
}
