pub mod record;
pub mod recordset;
pub mod store;
pub mod trigger;

pub use record::Record;
pub use recordset::RecordSet;
pub use store::Store;
pub use trigger::Trigger;
