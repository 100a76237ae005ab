pub mod layout;
pub mod segment;
pub mod segment_reader;
pub mod segment_writer;
pub mod wal;

pub use layout::StorageLayout;
pub use segment::{Segment, SegmentId, StoredRow};
pub use segment_reader::SegmentReader;
pub use segment_writer::SegmentWriter;
pub use wal::{Operation, Wal};
