// Table implementation
// A table combines a schema, paged row storage, and per-column indexes

use super::{btree::BTreeIndex, page::PageManager, Row, Schema, Value};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::ops::Bound;

const ROWS_PER_PAGE: usize = 256;

#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    page_manager: PageManager,
    /// Indexes keyed by lower-cased column name
    indexes: HashMap<String, BTreeIndex>,
}

impl Table {
    /// Create an empty table. The primary key column, if any, is indexed
    /// right away so uniqueness checks stay cheap during bulk loads.
    pub fn new(name: String, schema: Schema) -> Self {
        let mut table = Self {
            name,
            schema,
            page_manager: PageManager::new(ROWS_PER_PAGE),
            indexes: HashMap::new(),
        };

        if let Some(pk_index) = table.schema.get_primary_key_index() {
            let pk_name = table.schema.columns[pk_index].name.to_ascii_lowercase();
            table.indexes.insert(pk_name, BTreeIndex::default());
        }

        table
    }

    /// Insert a row in schema column order. Returns the new row id.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<usize> {
        if values.len() != self.schema.columns.len() {
            return Err(anyhow!(
                "Expected {} values for table '{}', got {}",
                self.schema.columns.len(),
                self.name,
                values.len()
            ));
        }

        let mut coerced = Vec::with_capacity(values.len());
        for (column, value) in self.schema.columns.iter().zip(values) {
            if value.is_null() && (!column.nullable || column.primary_key) {
                return Err(anyhow!(
                    "NULL value in NOT NULL column '{}.{}'",
                    self.name,
                    column.name
                ));
            }
            let shown = value.to_string();
            let value = value.coerce_to(&column.data_type).ok_or_else(|| {
                anyhow!(
                    "Type mismatch for column '{}.{}': expected {:?}, got {}",
                    self.name,
                    column.name,
                    column.data_type,
                    shown
                )
            })?;
            coerced.push(value);
        }

        if let Some(pk_index) = self.schema.get_primary_key_index() {
            let pk_name = self.schema.columns[pk_index].name.to_ascii_lowercase();
            let duplicate = self
                .indexes
                .get(&pk_name)
                .and_then(|index| index.lookup(&coerced[pk_index]))
                .is_some();
            if duplicate {
                return Err(anyhow!(
                    "Primary key violation in '{}': duplicate value {}",
                    self.name,
                    coerced[pk_index]
                ));
            }
        }

        let row_id = self.page_manager.insert(Row {
            values: coerced.clone(),
        });
        for (column, value) in self.schema.columns.iter().zip(coerced) {
            if let Some(index) = self.indexes.get_mut(&column.name.to_ascii_lowercase()) {
                index.insert(value, row_id);
            }
        }

        Ok(row_id)
    }

    /// Build an index on a column from the rows already stored
    pub fn create_index(&mut self, column_name: &str) -> Result<()> {
        let col_index = self
            .schema
            .get_column_index(column_name)
            .ok_or_else(|| anyhow!("Column not found: {}.{}", self.name, column_name))?;

        let key = column_name.to_ascii_lowercase();
        if self.indexes.contains_key(&key) {
            return Err(anyhow!(
                "Index already exists on column: {}.{}",
                self.name,
                column_name
            ));
        }

        let mut index = BTreeIndex::default();
        for (row_id, row) in self.page_manager.scan() {
            index.insert(row.values[col_index].clone(), row_id);
        }

        self.indexes.insert(key, index);
        Ok(())
    }

    pub fn has_index(&self, column_name: &str) -> bool {
        self.indexes
            .contains_key(&column_name.to_ascii_lowercase())
    }

    /// Row ids for `column` within the bounds, or `None` when the column
    /// has no index and the caller has to scan.
    pub fn indexed_range(
        &self,
        column_name: &str,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
    ) -> Option<Vec<usize>> {
        let index = self.indexes.get(&column_name.to_ascii_lowercase())?;
        Some(index.range(lower, upper))
    }

    /// Row ids equal to `value` in `column`, or `None` without an index
    pub fn indexed_lookup(&self, column_name: &str, value: &Value) -> Option<Vec<usize>> {
        let index = self.indexes.get(&column_name.to_ascii_lowercase())?;
        Some(index.lookup(value).cloned().unwrap_or_default())
    }

    pub fn get(&self, row_id: usize) -> Option<&Row> {
        self.page_manager.get(row_id)
    }

    /// Every row with its id, in storage order
    pub fn scan(&self) -> impl Iterator<Item = (usize, &Row)> + '_ {
        self.page_manager.scan()
    }

    pub fn row_count(&self) -> usize {
        self.page_manager.total_rows()
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Column, DataType};

    fn measurement_table() -> Table {
        let column = |name: &str, data_type: DataType, primary_key: bool, nullable: bool| Column {
            name: name.to_string(),
            data_type,
            primary_key,
            nullable,
        };
        Table::new(
            "measurement".to_string(),
            Schema::new(vec![
                column("id", DataType::Integer, true, false),
                column("station", DataType::Text, false, true),
                column("date", DataType::Text, false, true),
                column("prcp", DataType::Float, false, true),
                column("tobs", DataType::Float, false, true),
            ]),
        )
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_insert_coerces_integers_into_float_columns() {
        let mut table = measurement_table();
        table
            .insert(vec![
                Value::Integer(1),
                text("USC00519397"),
                text("2010-01-01"),
                Value::Null,
                Value::Integer(65),
            ])
            .unwrap();

        let row = table.get(0).unwrap();
        assert_eq!(row.values[3], Value::Null);
        assert_eq!(row.values[4], Value::Float(65.0));
    }

    #[test]
    fn test_insert_rejects_duplicate_primary_key() {
        let mut table = measurement_table();
        let row = || {
            vec![
                Value::Integer(7),
                text("USC00519397"),
                text("2010-01-01"),
                Value::Float(0.08),
                Value::Float(65.0),
            ]
        };
        table.insert(row()).unwrap();

        let err = table.insert(row()).unwrap_err();
        assert!(err.to_string().contains("Primary key violation"));
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_insert_rejects_wrong_arity_and_type() {
        let mut table = measurement_table();
        assert!(table.insert(vec![Value::Integer(1)]).is_err());
        assert!(table
            .insert(vec![
                Value::Integer(1),
                text("USC00519397"),
                text("2010-01-01"),
                text("wet"),
                Value::Float(65.0),
            ])
            .is_err());
    }

    #[test]
    fn test_index_created_after_load_covers_existing_rows() {
        let mut table = measurement_table();
        for (id, date) in ["2017-08-21", "2017-08-22", "2017-08-23"].iter().enumerate() {
            table
                .insert(vec![
                    Value::Integer(id as i64),
                    text("USC00519397"),
                    text(date),
                    Value::Float(0.0),
                    Value::Float(80.0),
                ])
                .unwrap();
        }

        assert!(table.indexed_range("date", Bound::Unbounded, Bound::Unbounded).is_none());
        table.create_index("date").unwrap();
        assert!(table.has_index("DATE"));
        assert!(table.create_index("date").is_err());

        let cutoff = text("2017-08-22");
        let ids = table
            .indexed_range("date", Bound::Included(&cutoff), Bound::Unbounded)
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(table.indexed_lookup("id", &Value::Integer(2)), Some(vec![2]));
    }
}
