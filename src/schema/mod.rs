pub mod field;
pub mod join;
pub mod key;
pub mod store_schema;

pub use field::{FieldDesc, FieldType};
pub use join::{JoinDesc, JoinKind};
pub use key::{IndexKey, KeyKind};
pub use store_schema::StoreSchema;
