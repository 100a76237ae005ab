use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{FieldId, FieldValue, JoinId, RecId, StoreId};
use crate::storage::layout::StorageLayout;

/// Write-ahead log for durability, one file per base directory per
/// rotation. Grounded on the teacher's `WAL`/`WALEntry`/`Operation` shape,
/// re-keyed from document mutations to store-row mutations.
pub struct Wal {
    file: File,
    position: u64,
    sync_mode: SyncMode,
    sequence: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum SyncMode {
    Immediate,
    Batch,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub sequence: u64,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    AddRec { store: StoreId, rec_id: RecId, fields: Vec<(FieldId, FieldValue)> },
    SetField { store: StoreId, rec_id: RecId, field: FieldId, value: FieldValue },
    DelRec { store: StoreId, rec_id: RecId },
    AddJoin { store: StoreId, rec_id: RecId, join: JoinId, target: RecId, freq: i64 },
    DelJoin { store: StoreId, rec_id: RecId, join: JoinId, target: RecId },
    Commit,
}

impl Wal {
    pub fn open(storage: &StorageLayout, sequence: u64) -> Result<Self> {
        let path = storage.wal_path(sequence);
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Wal { file, position: 0, sync_mode: SyncMode::Batch, sequence })
    }

    pub fn append(&mut self, operation: Operation) -> Result<()> {
        let entry = WalEntry { sequence: self.sequence, operation, timestamp: Utc::now() };

        let data = bincode::serialize(&entry)?;
        let len = data.len() as u32;

        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&data)?;

        self.sequence += 1;
        self.position += 4 + data.len() as u64;

        match self.sync_mode {
            SyncMode::Immediate => self.file.sync_all()?,
            SyncMode::Batch if self.position % (1024 * 1024) < (4 + data.len() as u64) => self.file.sync_all()?,
            _ => {}
        }

        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn rotate(&mut self, storage: &StorageLayout) -> Result<()> {
        self.sync()?;
        *self = Wal::open(storage, self.sequence)?;
        Ok(())
    }

    /// Reads every entry currently on disk, for crash recovery on open
    /// (`spec.md` §6's persistence paragraph, teacher's
    /// `Database::recover_from_wal`). Leaves the file positioned for
    /// further appends.
    pub fn read_entries(&mut self) -> Result<Vec<WalEntry>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut entries = Vec::new();
        let mut len_buf = [0u8; 4];
        loop {
            match self.file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            self.file.read_exact(&mut data)?;
            entries.push(bincode::deserialize(&data)?);
        }
        self.file.seek(SeekFrom::End(0))?;
        Ok(entries)
    }

    /// Discards every recorded entry — called once recovery has replayed
    /// them and (for a writable base) the stores are durably flushed.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.position = 0;
        Ok(())
    }
}
