use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::{FieldId, RecId};

/// Unique segment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single row as persisted to a store segment: the field/join
/// dictionary by-value representation from `spec.md` §4.6, flattened
/// for on-disk storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    pub rec_id: RecId,
    pub deleted: bool,
    pub fields: Vec<(FieldId, crate::core::types::FieldValue)>,
}

/// A flushed checkpoint of one store's rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub row_count: u32,
    pub metadata: SegmentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub created_at: DateTime<Utc>,
    pub size_bytes: usize,
    pub min_rec_id: RecId,
    pub max_rec_id: RecId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub version: u32,
    pub row_count: u32,
    pub checksum: u32,
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,
}

impl SegmentHeader {
    pub const VERSION: u32 = 1;

    pub fn new(row_count: u32, compression: CompressionType) -> Self {
        SegmentHeader { version: Self::VERSION, row_count, checksum: 0, compression }
    }
}
