// Dataset loader
// Builds the in-memory database from a SQL script (e.g. `sqlite3 hawaii.sqlite .dump`)

use crate::query::{QueryExecutor, QueryParser};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// Tables and the columns the climate queries read from them
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("measurement", &["station", "date", "prcp", "tobs"]),
    ("station", &["station"]),
];

/// Columns indexed after loading; the trailing-year and per-station filters hit them
const INDEXED_COLUMNS: &[(&str, &str)] = &[("measurement", "date"), ("measurement", "station")];

/// Load a SQL dump from disk
pub fn load_dataset(path: &Path) -> Result<QueryExecutor> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;

    info!(path = %path.display(), bytes = script.len(), "Loading dataset");
    load_script(&script).with_context(|| format!("Failed to load dataset {}", path.display()))
}

/// Execute a SQL script into a fresh database and prepare it for serving
pub fn load_script(script: &str) -> Result<QueryExecutor> {
    let queries = QueryParser::parse_script(script)?;
    let mut executor = QueryExecutor::new();

    for (position, query) in queries.into_iter().enumerate() {
        executor
            .execute(query)
            .with_context(|| format!("Statement {} failed", position + 1))?;
    }

    for (table_name, columns) in REQUIRED_COLUMNS {
        let table = executor
            .get_table(table_name)
            .ok_or_else(|| anyhow!("Dataset has no '{}' table", table_name))?;
        for column in *columns {
            if table.get_schema().get_column_index(column).is_none() {
                return Err(anyhow!(
                    "Table '{}' has no '{}' column",
                    table_name,
                    column
                ));
            }
        }
    }

    for (table_name, column) in INDEXED_COLUMNS {
        let needs_index = executor
            .get_table(table_name)
            .is_some_and(|table| !table.has_index(column));
        if needs_index {
            executor.execute(QueryParser::parse(&format!(
                "CREATE INDEX ON {} ({})",
                table_name, column
            ))?)?;
            debug!(table = table_name, column, "Created index");
        }
    }

    for name in executor.list_tables() {
        if let Some(table) = executor.get_table(&name) {
            info!(table = %name, rows = table.row_count(), "Table loaded");
        }
    }

    Ok(executor)
}
