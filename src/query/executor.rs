// Query Executor
// Holds every table and runs parsed queries against them.
// Writes go through `execute(&mut self)`; reads go through `select(&self)`,
// so a loaded executor can be shared behind an `Arc` without locking.

use super::parser::{
    AggregateFunction, ComparisonOp, OrderKey, Query, SelectExpr, SelectItem, SelectQuery,
    WhereClause,
};
use crate::storage::{btree::IndexKey, table::Table, Row, Value};
use anyhow::{anyhow, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

#[derive(Debug)]
pub struct QueryExecutor {
    /// Tables keyed by lower-cased name
    tables: HashMap<String, Table>,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Execute any supported statement
    pub fn execute(&mut self, query: Query) -> Result<QueryResult> {
        match query {
            Query::CreateTable {
                name,
                schema,
                if_not_exists,
            } => {
                let key = name.to_ascii_lowercase();
                if self.tables.contains_key(&key) {
                    if if_not_exists {
                        return Ok(QueryResult::Message(format!(
                            "Table '{}' already exists",
                            name
                        )));
                    }
                    return Err(anyhow!("Table '{}' already exists", name));
                }

                self.tables.insert(key, Table::new(name.clone(), schema));
                Ok(QueryResult::Message(format!("Table '{}' created", name)))
            }

            Query::Insert {
                table_name,
                columns,
                rows,
            } => {
                let table = self.table_mut(&table_name)?;
                let count = rows.len();
                for values in rows {
                    let values = Self::arrange_values(table, &columns, values)?;
                    table.insert(values)?;
                }

                Ok(QueryResult::Message(format!(
                    "{} row(s) inserted into '{}'",
                    count, table_name
                )))
            }

            Query::CreateIndex {
                table_name,
                column_name,
            } => {
                self.table_mut(&table_name)?.create_index(&column_name)?;
                Ok(QueryResult::Message(format!(
                    "Index created on '{}.{}'",
                    table_name, column_name
                )))
            }

            Query::Select(select) => self.select(&select),
        }
    }

    /// Run a SELECT. Never modifies the database.
    pub fn select(&self, query: &SelectQuery) -> Result<QueryResult> {
        let table = self.table(&query.table_name)?;
        let column_names = Self::output_names(table, &query.projection);

        // Resolve every referenced column up front so typos fail even on empty tables
        let resolver = ColumnResolver { table };
        resolver.check_columns(query)?;

        let rows = self.filtered_rows(table, query.where_clause.as_ref())?;

        // Each unit becomes one output row: a single row for plain queries,
        // a group of rows for aggregate queries
        let mut units: Vec<Vec<&Row>> = if query.is_aggregate() {
            Self::group_rows(&resolver, &query.group_by, rows)?
        } else {
            rows.into_iter().map(|row| vec![row]).collect()
        };

        if query.is_aggregate() {
            for item in &query.projection {
                match item {
                    SelectItem::Wildcard => {
                        return Err(anyhow!("SELECT * cannot be combined with aggregates"))
                    }
                    SelectItem::Expr {
                        expr: SelectExpr::Column(name),
                        ..
                    } if !query.group_by.iter().any(|g| g.eq_ignore_ascii_case(name)) => {
                        return Err(anyhow!(
                            "Column '{}' must appear in GROUP BY or inside an aggregate",
                            name
                        ))
                    }
                    _ => {}
                }
            }
        } else if query.order_by.iter().any(|key| key.expr.is_aggregate()) {
            return Err(anyhow!("ORDER BY aggregate requires an aggregate query"));
        }

        if !query.order_by.is_empty() {
            units = Self::sort_units(&resolver, &query.order_by, units)?;
        }

        if let Some(limit) = query.limit {
            units.truncate(limit);
        }

        let mut output = Vec::with_capacity(units.len());
        for unit in &units {
            let mut values = Vec::with_capacity(column_names.len());
            for item in &query.projection {
                match item {
                    SelectItem::Wildcard => {
                        if let Some(row) = unit.first() {
                            values.extend(row.values.iter().cloned());
                        }
                    }
                    SelectItem::Expr { expr, .. } => {
                        values.push(resolver.evaluate(expr, unit)?);
                    }
                }
            }
            output.push(Row { values });
        }

        Ok(QueryResult::Rows {
            rows: output,
            column_names,
        })
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.get_table(name)
            .ok_or_else(|| anyhow!("Table '{}' not found", name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("Table '{}' not found", name))
    }

    /// Map an INSERT's named columns onto schema order; unnamed columns get NULL
    fn arrange_values(table: &Table, columns: &[String], values: Vec<Value>) -> Result<Vec<Value>> {
        if columns.is_empty() {
            return Ok(values);
        }
        if columns.len() != values.len() {
            return Err(anyhow!(
                "INSERT names {} columns but supplies {} values",
                columns.len(),
                values.len()
            ));
        }

        let schema = table.get_schema();
        let mut arranged = vec![Value::Null; schema.columns.len()];
        for (column, value) in columns.iter().zip(values) {
            let index = schema
                .get_column_index(column)
                .ok_or_else(|| anyhow!("Column not found: {}.{}", table.name, column))?;
            arranged[index] = value;
        }
        Ok(arranged)
    }

    fn output_names(table: &Table, projection: &[SelectItem]) -> Vec<String> {
        projection
            .iter()
            .flat_map(|item| match item {
                SelectItem::Wildcard => table.get_schema().column_names(),
                SelectItem::Expr { expr, alias } => {
                    vec![alias.clone().unwrap_or_else(|| expr.to_string())]
                }
            })
            .collect()
    }

    /// Rows matching the WHERE clause, in storage order.
    ///
    /// If one of the comparisons targets an indexed column, the index yields
    /// the candidate row ids; otherwise every row is a candidate. The full
    /// predicate is then checked on each candidate.
    fn filtered_rows<'t>(
        &self,
        table: &'t Table,
        where_clause: Option<&WhereClause>,
    ) -> Result<Vec<&'t Row>> {
        let where_clause = match where_clause {
            Some(clause) => clause,
            None => return Ok(table.scan().map(|(_, row)| row).collect()),
        };

        let conjuncts = where_clause.conjuncts();
        let resolver = ColumnResolver { table };
        let mut checks = Vec::with_capacity(conjuncts.len());
        for (column, op, value) in &conjuncts {
            checks.push((resolver.index_of(column)?, *op, *value));
        }

        let candidates = conjuncts
            .iter()
            .find_map(|(column, op, value)| Self::index_candidates(table, column, *op, value));

        let matches = |row: &Row| {
            checks
                .iter()
                .all(|(index, op, value)| Self::compare(&row.values[*index], *op, value))
        };

        Ok(match candidates {
            Some(mut row_ids) => {
                row_ids.sort_unstable();
                row_ids
                    .into_iter()
                    .filter_map(|id| table.get(id))
                    .filter(|row| matches(row))
                    .collect()
            }
            None => table
                .scan()
                .map(|(_, row)| row)
                .filter(|row| matches(row))
                .collect(),
        })
    }

    fn index_candidates(
        table: &Table,
        column: &str,
        op: ComparisonOp,
        value: &Value,
    ) -> Option<Vec<usize>> {
        match op {
            ComparisonOp::Eq => table.indexed_lookup(column, value),
            ComparisonOp::Gt => table.indexed_range(column, Bound::Excluded(value), Bound::Unbounded),
            ComparisonOp::GtEq => {
                table.indexed_range(column, Bound::Included(value), Bound::Unbounded)
            }
            ComparisonOp::Lt => table.indexed_range(column, Bound::Unbounded, Bound::Excluded(value)),
            ComparisonOp::LtEq => {
                table.indexed_range(column, Bound::Unbounded, Bound::Included(value))
            }
            ComparisonOp::NotEq => None,
        }
    }

    /// SQL comparison: unknown (NULL or mixed types) never matches
    fn compare(left: &Value, op: ComparisonOp, right: &Value) -> bool {
        match left.compare(right) {
            Some(ordering) => match op {
                ComparisonOp::Eq => ordering == Ordering::Equal,
                ComparisonOp::NotEq => ordering != Ordering::Equal,
                ComparisonOp::Lt => ordering == Ordering::Less,
                ComparisonOp::LtEq => ordering != Ordering::Greater,
                ComparisonOp::Gt => ordering == Ordering::Greater,
                ComparisonOp::GtEq => ordering != Ordering::Less,
            },
            None => false,
        }
    }

    /// Partition rows by the GROUP BY columns, groups in ascending key order.
    /// Without GROUP BY every row lands in one group, which exists even when
    /// there are no rows.
    fn group_rows<'t>(
        resolver: &ColumnResolver<'t>,
        group_by: &[String],
        rows: Vec<&'t Row>,
    ) -> Result<Vec<Vec<&'t Row>>> {
        if group_by.is_empty() {
            return Ok(vec![rows]);
        }

        let indexes = group_by
            .iter()
            .map(|column| resolver.index_of(column))
            .collect::<Result<Vec<_>>>()?;

        let mut groups: BTreeMap<Vec<IndexKey>, Vec<&Row>> = BTreeMap::new();
        for row in rows {
            let key = indexes
                .iter()
                .map(|&i| IndexKey(row.values[i].clone()))
                .collect();
            groups.entry(key).or_default().push(row);
        }

        Ok(groups.into_values().collect())
    }

    /// Stable sort, so rows that tie on every key keep their storage order
    fn sort_units<'t>(
        resolver: &ColumnResolver<'t>,
        order_by: &[OrderKey],
        units: Vec<Vec<&'t Row>>,
    ) -> Result<Vec<Vec<&'t Row>>> {
        let mut keyed = Vec::with_capacity(units.len());
        for unit in units {
            let keys = order_by
                .iter()
                .map(|key| resolver.evaluate(&key.expr, &unit))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((keys, unit));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for ((left, right), key) in a.iter().zip(b).zip(order_by) {
                let ordering = left.sort_cmp(right);
                let ordering = if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, unit)| unit).collect())
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves column names against one table and evaluates select expressions
struct ColumnResolver<'t> {
    table: &'t Table,
}

impl<'t> ColumnResolver<'t> {
    fn index_of(&self, column: &str) -> Result<usize> {
        self.table
            .get_schema()
            .get_column_index(column)
            .ok_or_else(|| anyhow!("Column not found: {}.{}", self.table.name, column))
    }

    fn check_columns(&self, query: &SelectQuery) -> Result<()> {
        let projected = query.projection.iter().filter_map(|item| match item {
            SelectItem::Expr { expr, .. } => Some(expr),
            SelectItem::Wildcard => None,
        });
        for expr in projected.chain(query.order_by.iter().map(|key| &key.expr)) {
            match expr {
                SelectExpr::Column(name)
                | SelectExpr::Aggregate {
                    column: Some(name), ..
                } => {
                    self.index_of(name)?;
                }
                SelectExpr::Aggregate { column: None, .. } => {}
            }
        }
        if let Some(where_clause) = &query.where_clause {
            for (column, _, _) in where_clause.conjuncts() {
                self.index_of(column)?;
            }
        }
        for column in &query.group_by {
            self.index_of(column)?;
        }
        Ok(())
    }

    /// Evaluate an expression over a unit of rows. A bare column reads the
    /// first row; aggregates fold over all of them.
    fn evaluate(&self, expr: &SelectExpr, unit: &[&Row]) -> Result<Value> {
        match expr {
            SelectExpr::Column(name) => {
                let index = self.index_of(name)?;
                Ok(unit
                    .first()
                    .map(|row| row.values[index].clone())
                    .unwrap_or(Value::Null))
            }
            SelectExpr::Aggregate { function, column } => {
                let values: Vec<&Value> = match column {
                    None => return Ok(Value::Integer(unit.len() as i64)),
                    Some(name) => {
                        let index = self.index_of(name)?;
                        unit.iter()
                            .map(|row| &row.values[index])
                            .filter(|v| !v.is_null())
                            .collect()
                    }
                };
                aggregate(*function, &values)
            }
        }
    }
}

/// Fold non-NULL values with an aggregate function
fn aggregate(function: AggregateFunction, values: &[&Value]) -> Result<Value> {
    match function {
        AggregateFunction::Count => Ok(Value::Integer(values.len() as i64)),
        AggregateFunction::Min => Ok(values
            .iter()
            .copied()
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFunction::Max => Ok(values
            .iter()
            .copied()
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFunction::Avg | AggregateFunction::Sum => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut sum = 0.0;
            let mut all_integers = true;
            for value in values {
                sum += value
                    .as_f64()
                    .ok_or_else(|| anyhow!("{} requires numeric values, found {}", function, value))?;
                all_integers &= matches!(value, Value::Integer(_));
            }
            Ok(match function {
                AggregateFunction::Avg => Value::Float(sum / values.len() as f64),
                _ if all_integers => Value::Integer(sum as i64),
                _ => Value::Float(sum),
            })
        }
    }
}

/// The result of executing a statement
#[derive(Debug)]
pub enum QueryResult {
    Rows {
        rows: Vec<Row>,
        column_names: Vec<String>,
    },
    /// Acknowledgement for CREATE / INSERT
    Message(String),
}

impl QueryResult {
    /// Rows of a SELECT; statements that return a message yield nothing
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryResult::Rows { rows, .. } => rows,
            QueryResult::Message(_) => Vec::new(),
        }
    }

    /// Render as a box-drawn text table for the terminal
    pub fn format(&self) -> String {
        match self {
            QueryResult::Message(msg) => msg.clone(),
            QueryResult::Rows { rows, column_names } => {
                if rows.is_empty() {
                    return "No rows found".to_string();
                }

                let mut widths: Vec<usize> = column_names.iter().map(|c| c.chars().count()).collect();
                for row in rows {
                    for (i, value) in row.values.iter().enumerate() {
                        widths[i] = widths[i].max(value.to_string().chars().count());
                    }
                }

                let border = |left: &str, mid: &str, right: &str| {
                    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
                    format!("{}{}{}\n", left, segments.join(mid), right)
                };
                let line = |cells: Vec<String>| {
                    let mut out = String::from("│");
                    for (cell, width) in cells.iter().zip(&widths) {
                        out.push_str(&format!(" {:<width$} │", cell, width = width));
                    }
                    out.push('\n');
                    out
                };

                let mut result = border("┌", "┬", "┐");
                result.push_str(&line(column_names.clone()));
                result.push_str(&border("├", "┼", "┤"));
                for row in rows {
                    result.push_str(&line(row.values.iter().map(|v| v.to_string()).collect()));
                }
                result.push_str(&border("└", "┴", "┘"));
                result.push_str(&format!("\n{} row(s) returned", rows.len()));

                result
            }
        }
    }
}
