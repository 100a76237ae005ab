pub mod groupby;
pub mod linsearch;
pub mod splitby;

pub use groupby::GroupBy;
pub use linsearch::{LinSearch, LinSearchOp};
pub use splitby::SplitBy;
