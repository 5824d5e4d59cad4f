// Query module - SQL parsing and execution
pub mod executor;
pub mod parser;

pub use executor::{QueryExecutor, QueryResult};
pub use parser::{Query, QueryParser, SelectQuery};
