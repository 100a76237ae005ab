pub mod ast;
pub mod executor;
pub mod parser;

pub use ast::{Node, Query};
pub use executor::{ExecutionContext, Executor};
pub use parser::{parse_query, SchemaLookup};
