pub mod cache;
pub mod gix;
pub mod merger;
pub mod posting;

pub use gix::Gix;
pub use merger::Merger;
pub use posting::{PostingItem, PostingList};
