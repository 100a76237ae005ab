pub mod index_voc;
pub mod word_voc;

pub use index_voc::IndexVoc;
pub use word_voc::{SortType, WordVoc};
