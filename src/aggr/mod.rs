pub mod base;
pub mod ema;
pub mod item;
pub mod numeric;
pub mod time_window;

pub use base::{StreamAggr, StreamAggrBase};
pub use ema::Ema;
pub use item::ItemAggr;
pub use numeric::{GroupedNumericAggr, NumericAggr};
pub use time_window::TimeWindow;
