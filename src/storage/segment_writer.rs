use std::cmp;
use std::fs::File;
use std::io::Write;

use chrono::Utc;
use crc32fast::Hasher;

use crate::core::error::Result;
use crate::core::types::{RecId, StoreId};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{CompressionType, Segment, SegmentHeader, SegmentId, SegmentMetadata, StoredRow};

/// Accumulates a store's rows into one compressed, checksummed segment
/// file. Grounded on the teacher's `SegmentWriter` (buffer → flush →
/// finish with header+checksum), generalized from "document" to
/// "store row" and switched to length-prefixed header framing so the
/// header's encoded size never has to match a fixed byte budget.
pub struct SegmentWriter {
    pub segment: Segment,
    store: StoreId,
    body: Vec<u8>,
    hasher: Hasher,
    path: std::path::PathBuf,
}

impl SegmentWriter {
    pub fn new(storage: &StorageLayout, store: StoreId, segment_id: SegmentId, sequence: u64) -> Result<Self> {
        let path = storage.store_segment_path(store, sequence);
        let _ = segment_id;
        Ok(SegmentWriter {
            segment: Segment {
                id: segment_id,
                row_count: 0,
                metadata: SegmentMetadata {
                    created_at: Utc::now(),
                    size_bytes: 0,
                    min_rec_id: RecId(u64::MAX),
                    max_rec_id: RecId(0),
                },
            },
            store,
            body: Vec::with_capacity(1024 * 1024),
            hasher: Hasher::new(),
            path,
        })
    }

    pub fn write_row(&mut self, row: &StoredRow) -> Result<()> {
        let data = bincode::serialize(row)?;
        let compressed = lz4_flex::compress_prepend_size(&data);

        self.body.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        self.body.extend_from_slice(&compressed);

        self.segment.row_count += 1;
        self.segment.metadata.min_rec_id = RecId(cmp::min(self.segment.metadata.min_rec_id.0, row.rec_id.0));
        self.segment.metadata.max_rec_id = RecId(cmp::max(self.segment.metadata.max_rec_id.0, row.rec_id.0));

        Ok(())
    }

    /// Writes `[u32 header_len][header][rows…]` and fsyncs.
    pub fn finish(mut self) -> Result<Segment> {
        self.hasher.update(&self.body);
        let mut header = SegmentHeader::new(self.segment.row_count, CompressionType::Lz4);
        header.checksum = self.hasher.finalize();
        let header_bytes = bincode::serialize(&header)?;

        let mut file = File::create(&self.path)?;
        file.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        file.write_all(&header_bytes)?;
        file.write_all(&self.body)?;
        file.sync_all()?;

        self.segment.metadata.size_bytes = file.metadata()?.len() as usize;
        let _ = self.store;
        Ok(self.segment)
    }

    pub fn row_count(&self) -> usize {
        self.segment.row_count as usize
    }
}
