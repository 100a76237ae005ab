use std::path::PathBuf;

/// How a `Base` is attached to its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Directory must not hold a base yet; creates all artifacts fresh.
    Create,
    /// Directory holds a base; opened for reads and writes.
    Update,
    /// Directory holds a base; opened for reads only, no flush on close.
    ReadOnly,
    /// Directory holds a base; rebuild derived structures (vocabulary,
    /// geo index, stream-aggregate state) from the stores on open.
    Restore,
}

/// Resolution for a range-query literal that falls outside the key's
/// vocabulary. `spec.md` §9 leaves this an open question; we make it
/// explicit configuration, default = error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OovRangePolicy {
    Error,
    ClipToNearest,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,
    pub open_mode: OpenMode,

    /// Byte budget for the Gix posting-list LRU cache.
    pub cache_size_bytes: usize,
    /// Bucketing precision for geo keys, in degrees^-1 (default matches
    /// the original `TGeoIndex`: 1e-6 degrees, i.e. factor 1_000_000).
    pub geo_precision: f64,
    pub oov_range_policy: OovRangePolicy,

    pub writer_batch_size: usize,
    pub writer_commit_interval_secs: u64,
    pub writer_max_segment_size: usize,

    /// Verbosity for the core `Logger`: 0 silences info+debug, 1 keeps
    /// error+info, 2 keeps everything.
    pub log_verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            open_mode: OpenMode::Create,

            cache_size_bytes: 64 * 1024 * 1024,
            geo_precision: 1_000_000.0,
            oov_range_policy: OovRangePolicy::Error,

            writer_batch_size: 1000,
            writer_commit_interval_secs: 60,
            writer_max_segment_size: 50 * 1024 * 1024,

            log_verbosity: 1,
        }
    }
}
