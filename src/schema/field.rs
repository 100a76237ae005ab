use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::FieldId;

/// The scalar/vector field types a store's schema can declare
/// (`spec.md` §3). `FieldType` is the declared type; `FieldValue`
/// (`core::types`) is the runtime value that must match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    IntV,
    UInt64,
    String,
    StringV,
    Bool,
    Float,
    FloatPair,
    FloatV,
    Datetime,
    NumSpV,
    BowSpV,
}

impl FieldType {
    pub fn matches(&self, value: &crate::core::types::FieldValue) -> bool {
        use crate::core::types::FieldValue as V;
        matches!(
            (self, value),
            (FieldType::Int, V::Int(_))
                | (FieldType::IntV, V::IntSeq(_))
                | (FieldType::UInt64, V::UInt64(_))
                | (FieldType::String, V::Str(_))
                | (FieldType::StringV, V::StrSeq(_))
                | (FieldType::Bool, V::Bool(_))
                | (FieldType::Float, V::Flt(_))
                | (FieldType::FloatPair, V::FltPair(..))
                | (FieldType::FloatV, V::FltSeq(_))
                | (FieldType::Datetime, V::Timestamp(_))
                | (FieldType::NumSpV, V::NumericSparse(_))
                | (FieldType::BowSpV, V::BowSparse(_))
        ) || matches!(value, V::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDesc {
    pub field_id: FieldId,
    pub name: String,
    pub field_type: FieldType,
    pub primary: bool,
    pub null_allowed: bool,
    pub indexed: bool,
    /// Hidden field backing a field-join's target record id, never
    /// part of the public schema surface.
    pub internal: bool,
}

impl FieldDesc {
    pub fn new(field_id: FieldId, name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDesc {
            field_id,
            name: name.into(),
            field_type,
            primary: false,
            null_allowed: true,
            indexed: false,
            internal: false,
        }
    }

    pub fn check_value(&self, value: &crate::core::types::FieldValue) -> Result<()> {
        if value.is_null() && !self.null_allowed {
            return Err(Error::new(ErrorKind::NullViolation, format!("field '{}' is not nullable", self.name)));
        }
        if !self.field_type.matches(value) {
            return Err(Error::new(
                ErrorKind::TypeMismatch,
                format!("field '{}' expects {:?}, got {}", self.name, self.field_type, value.type_name()),
            ));
        }
        Ok(())
    }
}
