use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};

/// Record identifier, unique within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecId(pub u64);

impl RecId {
    pub const INVALID: RecId = RecId(u64::MAX);

    pub fn new(id: u64) -> Self {
        RecId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != u64::MAX
    }
}

impl From<u64> for RecId {
    fn from(id: u64) -> Self {
        RecId(id)
    }
}

/// Store identifier, 0..254. 255 is reserved as "no store".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u8);

/// Index key identifier, globally unique across all stores in a base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u32);

/// Vocabulary word identifier, 64-bit per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WordId(pub u64);

/// Field identifier, unique within the owning store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub u16);

/// Join identifier, unique within the owning store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JoinId(pub u16);

/// Posting / record-set weight. Negative values only ever appear as
/// intermediate merger state; a persisted posting list never carries one.
pub type Freq = i64;

/// The per-field value variants from `spec.md` §3 / §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Int(i64),
    IntSeq(Vec<i64>),
    UInt64(u64),
    Str(String),
    StrSeq(Vec<String>),
    Bool(bool),
    Flt(f64),
    FltPair(f64, f64),
    FltSeq(Vec<f64>),
    Timestamp(DateTime<Utc>),
    /// Sparse numeric vector, stored lossily as "idx:val idx:val …".
    NumericSparse(Vec<(u64, f64)>),
    /// Bag-of-words sparse vector; opaque placeholder, per spec §1/§6
    /// (feature extraction is a non-goal — we keep the wire shape only).
    BowSparse(Vec<u8>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "Null",
            FieldValue::Int(_) => "Int",
            FieldValue::IntSeq(_) => "IntSeq",
            FieldValue::UInt64(_) => "UInt64",
            FieldValue::Str(_) => "Str",
            FieldValue::StrSeq(_) => "StrSeq",
            FieldValue::Bool(_) => "Bool",
            FieldValue::Flt(_) => "Flt",
            FieldValue::FltPair(..) => "FltPair",
            FieldValue::FltSeq(_) => "FltSeq",
            FieldValue::Timestamp(_) => "Timestamp",
            FieldValue::NumericSparse(_) => "NumericSparse",
            FieldValue::BowSparse(_) => "BowSparse",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            FieldValue::Int(v) => Ok(*v),
            other => Err(wrong_type("Int", other)),
        }
    }

    pub fn as_uint64(&self) -> Result<u64> {
        match self {
            FieldValue::UInt64(v) => Ok(*v),
            other => Err(wrong_type("UInt64", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            FieldValue::Str(v) => Ok(v),
            other => Err(wrong_type("Str", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            FieldValue::Bool(v) => Ok(*v),
            other => Err(wrong_type("Bool", other)),
        }
    }

    pub fn as_flt(&self) -> Result<f64> {
        match self {
            FieldValue::Flt(v) => Ok(*v),
            other => Err(wrong_type("Flt", other)),
        }
    }

    pub fn as_timestamp(&self) -> Result<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(v) => Ok(*v),
            other => Err(wrong_type("Timestamp", other)),
        }
    }

    /// Serde-JSON representation per the table in `spec.md` §6.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Int(v) => json!(v),
            FieldValue::IntSeq(v) => json!(v),
            FieldValue::UInt64(v) => json!(v),
            FieldValue::Str(v) => json!(v),
            FieldValue::StrSeq(v) => json!(v),
            FieldValue::Bool(v) => json!(v),
            FieldValue::Flt(v) => json!(v),
            FieldValue::FltPair(a, b) => json!([a, b]),
            FieldValue::FltSeq(v) => json!(v),
            FieldValue::Timestamp(v) => json!(v.to_rfc3339()),
            FieldValue::NumericSparse(pairs) => {
                let s = pairs
                    .iter()
                    .map(|(i, v)| format!("{}:{}", i, v))
                    .collect::<Vec<_>>()
                    .join(" ");
                json!(s)
            }
            FieldValue::BowSparse(_) => json!("<bow-sparse>"),
        }
    }
}

fn wrong_type(expected: &str, actual: &FieldValue) -> Error {
    Error::new(
        ErrorKind::WrongFieldType,
        format!("expected {}, found {}", expected, actual.type_name()),
    )
}
