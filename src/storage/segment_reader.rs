use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::RecId;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{SegmentHeader, StoredRow};

/// Reads back a segment written by `SegmentWriter`: a length-prefixed
/// header followed by length-prefixed, lz4-compressed rows.
pub struct SegmentReader {
    pub header: SegmentHeader,
    file: File,
    body_start: u64,
}

impl SegmentReader {
    pub fn open(storage: &StorageLayout, store: crate::core::types::StoreId, sequence: u64) -> Result<Self> {
        let path = storage.store_segment_path(store, sequence);
        let mut file = File::open(path)?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let header_len = u32::from_le_bytes(len_buf) as usize;

        let mut header_buf = vec![0u8; header_len];
        file.read_exact(&mut header_buf)?;
        let header: SegmentHeader = bincode::deserialize(&header_buf)?;

        if header.version != SegmentHeader::VERSION {
            return Err(Error::new(ErrorKind::IndexCorrupt, "incompatible segment version"));
        }

        let body_start = 4 + header_len as u64;
        Ok(SegmentReader { header, file, body_start })
    }

    pub fn read_all_rows(&mut self) -> Result<Vec<StoredRow>> {
        self.file.seek(SeekFrom::Start(self.body_start))?;
        self.verify_checksum()?;
        self.file.seek(SeekFrom::Start(self.body_start))?;

        let mut rows = Vec::with_capacity(self.header.row_count as usize);
        for _ in 0..self.header.row_count {
            rows.push(self.read_one_row()?);
        }
        Ok(rows)
    }

    pub fn find_row(&mut self, rec_id: RecId) -> Result<Option<StoredRow>> {
        self.file.seek(SeekFrom::Start(self.body_start))?;
        for _ in 0..self.header.row_count {
            let row = self.read_one_row()?;
            if row.rec_id == rec_id {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn read_one_row(&mut self) -> Result<StoredRow> {
        let mut len_buf = [0u8; 4];
        self.file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut compressed = vec![0u8; len];
        self.file.read_exact(&mut compressed)?;
        let data = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| Error::new(ErrorKind::IndexCorrupt, e.to_string()))?;

        Ok(bincode::deserialize(&data)?)
    }

    fn verify_checksum(&mut self) -> Result<()> {
        let mut body = Vec::new();
        self.file.read_to_end(&mut body)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        if hasher.finalize() != self.header.checksum {
            return Err(Error::new(ErrorKind::IndexCorrupt, "segment checksum mismatch"));
        }
        Ok(())
    }
}
