use serde::{Deserialize, Serialize};

use crate::core::types::{FieldId, JoinId, KeyId, StoreId};

/// One store's declared join. Field-joins carry their target record id
/// and frequency as a hidden `(UInt64, Int)` field pair on the owning
/// record; index-joins go through Gix via `join_key_id` instead
/// (`spec.md` §4.5, §9's "mixed responsibility of Join").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Field,
    Index,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDesc {
    pub join_id: JoinId,
    pub name: String,
    pub join_store_id: StoreId,
    pub kind: JoinKind,
    /// Set only for `JoinKind::Field`: the hidden `(UInt64, Int)` field
    /// pair holding `(target RecId, Freq)`, initialized to `(Mx, 0)`.
    pub field_rec_id: Option<FieldId>,
    pub field_freq: Option<FieldId>,
    /// Set only for `JoinKind::Index`: the Gix key the join's postings
    /// live under.
    pub join_key_id: Option<KeyId>,
    /// The join on the other side that mirrors this one, wired by
    /// `StoreSchema::link_inverse_joins` once both stores exist.
    pub inverse_join_id: Option<JoinId>,
}

impl JoinDesc {
    pub fn field_join(join_id: JoinId, name: impl Into<String>, join_store_id: StoreId, field_rec_id: FieldId, field_freq: FieldId) -> Self {
        JoinDesc {
            join_id,
            name: name.into(),
            join_store_id,
            kind: JoinKind::Field,
            field_rec_id: Some(field_rec_id),
            field_freq: Some(field_freq),
            join_key_id: None,
            inverse_join_id: None,
        }
    }

    pub fn index_join(join_id: JoinId, name: impl Into<String>, join_store_id: StoreId, join_key_id: KeyId) -> Self {
        JoinDesc {
            join_id,
            name: name.into(),
            join_store_id,
            kind: JoinKind::Index,
            field_rec_id: None,
            field_freq: None,
            join_key_id: Some(join_key_id),
            inverse_join_id: None,
        }
    }

    pub fn is_field_join(&self) -> bool {
        self.kind == JoinKind::Field
    }

    pub fn is_index_join(&self) -> bool {
        self.kind == JoinKind::Index
    }

    pub fn is_inverse_wired(&self) -> bool {
        self.inverse_join_id.is_some()
    }
}
