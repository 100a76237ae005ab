use std::fs;
use std::path::PathBuf;

use crate::core::error::Result;
use crate::core::types::{KeyId, StoreId, WordId};

/// Directory structure for a base's data files. Four logical artifacts
/// persist per base directory (`spec.md` §6): the Gix posting files,
/// `IndexVoc.dat`, `StreamAggr.dat`, `Index.Geo`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    pub stores_dir: PathBuf,
    pub gix_dir: PathBuf,
    pub wal_dir: PathBuf,
    pub meta_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let stores_dir = base_dir.join("stores");
        let gix_dir = base_dir.join("gix");
        let wal_dir = base_dir.join("wal");
        let meta_dir = base_dir.join("meta");

        fs::create_dir_all(&stores_dir)?;
        fs::create_dir_all(&gix_dir)?;
        fs::create_dir_all(&wal_dir)?;
        fs::create_dir_all(&meta_dir)?;

        Ok(StorageLayout { base_dir, stores_dir, gix_dir, wal_dir, meta_dir })
    }

    pub fn store_segment_path(&self, store: StoreId, segment: u64) -> PathBuf {
        self.stores_dir.join(format!("store_{}_{:08}.seg", store.0, segment))
    }

    pub fn posting_path(&self, key: KeyId, word: WordId) -> PathBuf {
        self.gix_dir.join(format!("{}_{}.pl", key.0, word.0))
    }

    pub fn wal_path(&self, sequence: u64) -> PathBuf {
        self.wal_dir.join(format!("wal_{:08}.log", sequence))
    }

    pub fn index_voc_path(&self) -> PathBuf {
        self.meta_dir.join("IndexVoc.dat")
    }

    pub fn stream_aggr_path(&self) -> PathBuf {
        self.meta_dir.join("StreamAggr.dat")
    }

    pub fn geo_index_path(&self) -> PathBuf {
        self.meta_dir.join("Index.Geo")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.meta_dir.join("Schema.dat")
    }

    /// A base directory is considered to hold an existing base only
    /// when all four logical artifacts are present.
    pub fn base_exists(&self) -> bool {
        self.index_voc_path().exists()
            && self.stream_aggr_path().exists()
            && self.geo_index_path().exists()
            && self.schema_path().exists()
    }
}
