use serde::{Deserialize, Serialize};

use crate::core::types::{FieldId, KeyId};
use crate::vocab::SortType;

/// What kind of values an `IndexKey` tokenizes and indexes
/// (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    /// Exact-value indexing (no tokenization).
    Value,
    /// Free-text, tokenized before indexing.
    Text,
    /// Backs a `GeoIndex` instead of a `WordVoc`.
    Location,
    /// Hidden key backing an index-join; never surfaced to the query
    /// language.
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexKey {
    pub key_id: KeyId,
    pub name: String,
    pub field_id: FieldId,
    pub kind: KeyKind,
    pub sort_type: SortType,
    /// Present only for `KeyKind::Text`: the tokenizer name registered
    /// in `analysis::tokenizer`.
    pub tokenizer: Option<String>,
}

impl IndexKey {
    pub fn value(key_id: KeyId, name: impl Into<String>, field_id: FieldId, sort_type: SortType) -> Self {
        IndexKey { key_id, name: name.into(), field_id, kind: KeyKind::Value, sort_type, tokenizer: None }
    }

    pub fn text(key_id: KeyId, name: impl Into<String>, field_id: FieldId, tokenizer: impl Into<String>) -> Self {
        IndexKey {
            key_id,
            name: name.into(),
            field_id,
            kind: KeyKind::Text,
            sort_type: SortType::ByStr,
            tokenizer: Some(tokenizer.into()),
        }
    }

    pub fn location(key_id: KeyId, name: impl Into<String>, field_id: FieldId) -> Self {
        IndexKey { key_id, name: name.into(), field_id, kind: KeyKind::Location, sort_type: SortType::ByStr, tokenizer: None }
    }

    pub fn internal(key_id: KeyId, name: impl Into<String>, field_id: FieldId) -> Self {
        IndexKey { key_id, name: name.into(), field_id, kind: KeyKind::Internal, sort_type: SortType::ById, tokenizer: None }
    }

    pub fn is_internal(&self) -> bool {
        self.kind == KeyKind::Internal
    }
}
