// Surfsup - read-only climate API over a weather-station dataset
// The dataset lives in a small in-memory SQL engine; the API maps each route
// onto one or two SELECTs against it

pub mod api;
pub mod climate;
pub mod config;
pub mod error;
pub mod loader;
pub mod query;
pub mod storage;

pub use api::router;
pub use climate::ClimateStore;
pub use error::ApiError;
pub use loader::{load_dataset, load_script};
pub use query::{QueryExecutor, QueryParser};
pub use storage::{Column, DataType, Row, Schema, Value};
