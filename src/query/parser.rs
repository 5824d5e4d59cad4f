// SQL Parser
// Converts SQL text into the typed `Query` the executor runs.
// sqlparser handles the grammar; this module narrows its AST to the subset
// the engine supports and rejects everything else with a clear message.

use crate::storage::{Column, DataType, Schema, Value};
use anyhow::{anyhow, Result};
use sqlparser::ast::{
    BinaryOperator, ColumnOption, DataType as SqlDataType, Expr, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, ObjectName, Select, SelectItem as SqlSelectItem, SetExpr,
    Statement, TableConstraint, TableFactor, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::fmt;

/// A statement the engine can execute
#[derive(Debug, Clone)]
pub enum Query {
    /// CREATE TABLE [IF NOT EXISTS] name (col TYPE, ...)
    CreateTable {
        name: String,
        schema: Schema,
        if_not_exists: bool,
    },
    /// INSERT INTO name [(cols)] VALUES (...), (...)
    Insert {
        table_name: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// CREATE INDEX [name] ON table (column)
    CreateIndex {
        table_name: String,
        column_name: String,
    },
    Select(SelectQuery),
}

/// A single-table SELECT
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub table_name: String,
    pub projection: Vec<SelectItem>,
    pub where_clause: Option<WhereClause>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// True when any projected item aggregates, or GROUP BY is present
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.projection.iter().any(|item| match item {
                SelectItem::Expr { expr, .. } => expr.is_aggregate(),
                SelectItem::Wildcard => false,
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr {
        expr: SelectExpr,
        alias: Option<String>,
    },
}

/// Something that yields one value per output row
#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    Column(String),
    /// `column: None` is `COUNT(*)`
    Aggregate {
        function: AggregateFunction,
        column: Option<String>,
    },
}

impl SelectExpr {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectExpr::Aggregate { .. })
    }
}

impl fmt::Display for SelectExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectExpr::Column(name) => write!(f, "{}", name),
            SelectExpr::Aggregate { function, column } => {
                write!(f, "{}({})", function, column.as_deref().unwrap_or("*"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Min,
    Max,
    Avg,
    Sum,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Sum => "SUM",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: SelectExpr,
    pub descending: bool,
}

/// A WHERE predicate: comparisons against literals joined with AND
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    Comparison {
        column: String,
        op: ComparisonOp,
        value: Value,
    },
    And(Box<WhereClause>, Box<WhereClause>),
}

impl WhereClause {
    /// Flatten nested ANDs into their comparisons
    pub fn conjuncts(&self) -> Vec<(&str, ComparisonOp, &Value)> {
        match self {
            WhereClause::Comparison { column, op, value } => vec![(column.as_str(), *op, value)],
            WhereClause::And(left, right) => {
                let mut all = left.conjuncts();
                all.extend(right.conjuncts());
                all
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ComparisonOp {
    /// The operator with its operands swapped: `a < b` is `b > a`
    fn flipped(self) -> Self {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::LtEq => ComparisonOp::GtEq,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::GtEq => ComparisonOp::LtEq,
            other => other,
        }
    }
}

pub struct QueryParser;

impl QueryParser {
    /// Parse exactly one SQL statement
    pub fn parse(sql: &str) -> Result<Query> {
        let mut queries = Self::parse_script(sql)?;
        if queries.len() != 1 {
            return Err(anyhow!(
                "Expected a single statement, found {}",
                queries.len()
            ));
        }
        Ok(queries.remove(0))
    }

    /// Parse a script of `;`-separated statements, such as a SQLite dump.
    /// Transaction control and PRAGMA statements carry no data and are dropped.
    pub fn parse_script(sql: &str) -> Result<Vec<Query>> {
        // Dumps write PRAGMA values as bare words (`foreign_keys=OFF`), which the
        // generic grammar rejects, so those lines are removed before parsing
        let sql = sql
            .lines()
            .filter(|line| {
                !line
                    .trim_start()
                    .get(..6)
                    .is_some_and(|head| head.eq_ignore_ascii_case("PRAGMA"))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let dialect = GenericDialect {};
        let ast = Parser::parse_sql(&dialect, &sql)
            .map_err(|e| anyhow!("SQL parsing error: {}", e))?;

        ast.iter()
            .filter(|statement| !Self::is_control_statement(statement))
            .map(Self::parse_statement)
            .collect()
    }

    fn is_control_statement(statement: &Statement) -> bool {
        matches!(
            statement,
            Statement::StartTransaction { .. }
                | Statement::Commit { .. }
                | Statement::Rollback { .. }
                | Statement::Pragma { .. }
        )
    }

    fn parse_statement(statement: &Statement) -> Result<Query> {
        match statement {
            Statement::CreateTable(create_table) => Self::parse_create_table(create_table),
            Statement::Insert(insert) => Self::parse_insert(insert),
            Statement::Query(query) => Ok(Query::Select(Self::parse_select(query)?)),
            Statement::CreateIndex(create_index) => Self::parse_create_index(create_index),
            _ => Err(anyhow!("Unsupported SQL statement: {}", statement)),
        }
    }

    fn parse_create_table(create_table: &sqlparser::ast::CreateTable) -> Result<Query> {
        let name = Self::object_name(&create_table.name);

        // Table-level PRIMARY KEY (col), as SQLite dumps write it
        let mut table_primary_key = Vec::new();
        for constraint in &create_table.constraints {
            if let TableConstraint::PrimaryKey { columns, .. } = constraint {
                table_primary_key.extend(columns.iter().map(|c| c.value.to_ascii_lowercase()));
            }
        }
        if table_primary_key.len() > 1 {
            return Err(anyhow!("Composite primary keys are not supported"));
        }

        let mut columns = Vec::new();
        for column_def in &create_table.columns {
            let column_name = column_def.name.value.clone();
            let data_type = Self::parse_data_type(&column_def.data_type)?;

            let primary_key = table_primary_key.contains(&column_name.to_ascii_lowercase())
                || column_def.options.iter().any(|opt| {
                    matches!(opt.option, ColumnOption::Unique { is_primary: true, .. })
                });

            let nullable = !column_def
                .options
                .iter()
                .any(|opt| matches!(opt.option, ColumnOption::NotNull));

            columns.push(Column {
                name: column_name,
                data_type,
                primary_key,
                nullable,
            });
        }

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(anyhow!("Composite primary keys are not supported"));
        }

        Ok(Query::CreateTable {
            name,
            schema: Schema::new(columns),
            if_not_exists: create_table.if_not_exists,
        })
    }

    fn parse_insert(insert: &sqlparser::ast::Insert) -> Result<Query> {
        let table_name = Self::object_name(&insert.table_name);
        let columns = insert.columns.iter().map(|c| c.value.clone()).collect();

        let rows = match &insert.source {
            Some(source) => match source.body.as_ref() {
                SetExpr::Values(values) => {
                    if values.rows.is_empty() {
                        return Err(anyhow!("No values provided"));
                    }
                    values
                        .rows
                        .iter()
                        .map(|row| Self::parse_values(row))
                        .collect::<Result<Vec<_>>>()?
                }
                _ => return Err(anyhow!("Only INSERT ... VALUES is supported")),
            },
            None => return Err(anyhow!("No values provided")),
        };

        Ok(Query::Insert {
            table_name,
            columns,
            rows,
        })
    }

    fn parse_select(query: &sqlparser::ast::Query) -> Result<SelectQuery> {
        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select,
            _ => return Err(anyhow!("Unsupported SELECT format")),
        };

        if select.having.is_some() {
            return Err(anyhow!("HAVING is not supported"));
        }

        let table_name = Self::extract_table_name(select)?;

        let projection = select
            .projection
            .iter()
            .map(Self::parse_select_item)
            .collect::<Result<Vec<_>>>()?;

        let where_clause = select
            .selection
            .as_ref()
            .map(Self::parse_where_clause)
            .transpose()?;

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(Self::column_name)
                .collect::<Result<Vec<_>>>()?,
            GroupByExpr::All(_) => return Err(anyhow!("GROUP BY ALL is not supported")),
        };

        let mut order_by = Vec::new();
        if let Some(clause) = &query.order_by {
            for item in &clause.exprs {
                let expr = Self::parse_select_expr(&item.expr)?;
                order_by.push(OrderKey {
                    expr: Self::resolve_alias(expr, &projection),
                    descending: item.asc == Some(false),
                });
            }
        }

        let limit = match &query.limit {
            Some(Expr::Value(SqlValue::Number(n, _))) => Some(
                n.parse::<usize>()
                    .map_err(|_| anyhow!("Invalid LIMIT: {}", n))?,
            ),
            Some(other) => return Err(anyhow!("Unsupported LIMIT expression: {}", other)),
            None => None,
        };

        Ok(SelectQuery {
            table_name,
            projection,
            where_clause,
            group_by,
            order_by,
            limit,
        })
    }

    fn parse_create_index(create_index: &sqlparser::ast::CreateIndex) -> Result<Query> {
        let table_name = Self::object_name(&create_index.table_name);

        if create_index.columns.len() != 1 {
            return Err(anyhow!("Only single column indexes are supported"));
        }
        let column_name = Self::column_name(&create_index.columns[0].expr)?;

        Ok(Query::CreateIndex {
            table_name,
            column_name,
        })
    }

    fn parse_data_type(sql_type: &SqlDataType) -> Result<DataType> {
        match sql_type {
            SqlDataType::Int(_)
            | SqlDataType::Integer(_)
            | SqlDataType::BigInt(_)
            | SqlDataType::SmallInt(_) => Ok(DataType::Integer),
            SqlDataType::Float(_)
            | SqlDataType::Double
            | SqlDataType::Real
            | SqlDataType::Decimal(_)
            | SqlDataType::Numeric(_) => Ok(DataType::Float),
            SqlDataType::Text
            | SqlDataType::Varchar(_)
            | SqlDataType::Char(_)
            | SqlDataType::String(_) => Ok(DataType::Text),
            SqlDataType::Boolean | SqlDataType::Bool => Ok(DataType::Boolean),
            _ => Err(anyhow!("Unsupported data type: {}", sql_type)),
        }
    }

    fn parse_values(exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(Self::parse_value).collect()
    }

    fn parse_value(expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Value(SqlValue::Number(n, _)) => {
                if n.contains(['.', 'e', 'E']) {
                    Ok(Value::Float(n.parse()?))
                } else {
                    Ok(Value::Integer(n.parse()?))
                }
            }
            Expr::Value(SqlValue::SingleQuotedString(s))
            | Expr::Value(SqlValue::DoubleQuotedString(s)) => Ok(Value::Text(s.clone())),
            Expr::Value(SqlValue::Boolean(b)) => Ok(Value::Boolean(*b)),
            Expr::Value(SqlValue::Null) => Ok(Value::Null),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match Self::parse_value(expr)? {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(anyhow!("Cannot negate {}", other)),
            },
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => Self::parse_value(expr),
            _ => Err(anyhow!("Unsupported value expression: {}", expr)),
        }
    }

    fn parse_select_item(item: &SqlSelectItem) -> Result<SelectItem> {
        match item {
            SqlSelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            SqlSelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: Self::parse_select_expr(expr)?,
                alias: None,
            }),
            SqlSelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: Self::parse_select_expr(expr)?,
                alias: Some(alias.value.clone()),
            }),
            _ => Err(anyhow!("Unsupported select item: {}", item)),
        }
    }

    fn parse_select_expr(expr: &Expr) -> Result<SelectExpr> {
        match expr {
            Expr::Function(function) => {
                let name = Self::object_name(&function.name).to_ascii_uppercase();
                let aggregate = match name.as_str() {
                    "COUNT" => AggregateFunction::Count,
                    "MIN" => AggregateFunction::Min,
                    "MAX" => AggregateFunction::Max,
                    "AVG" => AggregateFunction::Avg,
                    "SUM" => AggregateFunction::Sum,
                    _ => return Err(anyhow!("Unsupported function: {}", name)),
                };

                let args = match &function.args {
                    FunctionArguments::List(list) => &list.args,
                    _ => return Err(anyhow!("{} expects one argument", name)),
                };
                if args.len() != 1 {
                    return Err(anyhow!("{} expects one argument", name));
                }

                let column = match &args[0] {
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard)
                        if aggregate == AggregateFunction::Count =>
                    {
                        None
                    }
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(arg)) => {
                        Some(Self::column_name(arg)?)
                    }
                    other => return Err(anyhow!("Unsupported argument to {}: {}", name, other)),
                };

                Ok(SelectExpr::Aggregate {
                    function: aggregate,
                    column,
                })
            }
            Expr::Nested(inner) => Self::parse_select_expr(inner),
            _ => Ok(SelectExpr::Column(Self::column_name(expr)?)),
        }
    }

    /// ORDER BY may name a projection alias; swap it for the aliased expression
    fn resolve_alias(expr: SelectExpr, projection: &[SelectItem]) -> SelectExpr {
        if let SelectExpr::Column(name) = &expr {
            for item in projection {
                if let SelectItem::Expr {
                    expr: aliased,
                    alias: Some(alias),
                } = item
                {
                    if alias.eq_ignore_ascii_case(name) {
                        return aliased.clone();
                    }
                }
            }
        }
        expr
    }

    fn extract_table_name(select: &Select) -> Result<String> {
        if select.from.len() != 1 || !select.from[0].joins.is_empty() {
            return Err(anyhow!("SELECT must read from exactly one table"));
        }

        match &select.from[0].relation {
            TableFactor::Table { name, .. } => Ok(Self::object_name(name)),
            _ => Err(anyhow!("Unsupported table reference")),
        }
    }

    /// WHERE: `column op literal` comparisons joined with AND
    fn parse_where_clause(expr: &Expr) -> Result<WhereClause> {
        match expr {
            Expr::Nested(inner) => Self::parse_where_clause(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(WhereClause::And(
                Box::new(Self::parse_where_clause(left)?),
                Box::new(Self::parse_where_clause(right)?),
            )),
            Expr::BinaryOp { left, op, right } => {
                let op = match op {
                    BinaryOperator::Eq => ComparisonOp::Eq,
                    BinaryOperator::NotEq => ComparisonOp::NotEq,
                    BinaryOperator::Lt => ComparisonOp::Lt,
                    BinaryOperator::LtEq => ComparisonOp::LtEq,
                    BinaryOperator::Gt => ComparisonOp::Gt,
                    BinaryOperator::GtEq => ComparisonOp::GtEq,
                    _ => return Err(anyhow!("Unsupported operator in WHERE clause: {}", op)),
                };

                // Accept the literal on either side
                if let Ok(column) = Self::column_name(left) {
                    let value = Self::parse_value(right)?;
                    Ok(WhereClause::Comparison { column, op, value })
                } else {
                    let column = Self::column_name(right)?;
                    let value = Self::parse_value(left)?;
                    Ok(WhereClause::Comparison {
                        column,
                        op: op.flipped(),
                        value,
                    })
                }
            }
            _ => Err(anyhow!("Unsupported WHERE clause: {}", expr)),
        }
    }

    /// A column reference; `table.column` keeps only the column part
    fn column_name(expr: &Expr) -> Result<String> {
        match expr {
            Expr::Identifier(ident) => Ok(ident.value.clone()),
            Expr::CompoundIdentifier(idents) => idents
                .last()
                .map(|ident| ident.value.clone())
                .ok_or_else(|| anyhow!("Empty column reference")),
            Expr::Nested(inner) => Self::column_name(inner),
            _ => Err(anyhow!("Expected a column name, found {}", expr)),
        }
    }

    fn object_name(name: &ObjectName) -> String {
        name.0
            .iter()
            .map(|i| i.value.clone())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(sql: &str) -> SelectQuery {
        match QueryParser::parse(sql).unwrap() {
            Query::Select(select) => select,
            other => panic!("expected SELECT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_sqlite_style_create_table() {
        let query = QueryParser::parse(
            "CREATE TABLE measurement (id INTEGER NOT NULL, station VARCHAR(255), \
             date TEXT, prcp FLOAT, tobs FLOAT, PRIMARY KEY (id))",
        )
        .unwrap();

        match query {
            Query::CreateTable { name, schema, .. } => {
                assert_eq!(name, "measurement");
                assert_eq!(schema.columns.len(), 5);
                assert!(schema.columns[0].primary_key);
                assert!(!schema.columns[0].nullable);
                assert_eq!(schema.columns[1].data_type, DataType::Text);
                assert_eq!(schema.columns[3].data_type, DataType::Float);
                assert!(schema.columns[3].nullable);
            }
            other => panic!("expected CREATE TABLE, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multi_row_insert_with_negative_numbers() {
        let query = QueryParser::parse(
            "INSERT INTO station VALUES (1, 'USC00519397', 'WAIKIKI 717.2, HI US', 21.2716, -157.8168, 3.0), \
             (2, 'USC00513117', 'KANEOHE 838.1, HI US', 21.4234, -157.8015, 14.6)",
        )
        .unwrap();

        match query {
            Query::Insert {
                table_name, rows, ..
            } => {
                assert_eq!(table_name, "station");
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0][2], Value::Text("WAIKIKI 717.2, HI US".into()));
                assert_eq!(rows[1][4], Value::Float(-157.8015));
            }
            other => panic!("expected INSERT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_script_drops_transaction_control() {
        let queries = QueryParser::parse_script(
            "PRAGMA foreign_keys=OFF;\n\
             BEGIN TRANSACTION;\n\
             CREATE TABLE station (station TEXT);\n\
             INSERT INTO station VALUES('USC00519397');\n\
             COMMIT;",
        )
        .unwrap();

        assert_eq!(queries.len(), 2);
        assert!(matches!(queries[0], Query::CreateTable { .. }));
        assert!(matches!(queries[1], Query::Insert { .. }));
    }

    #[test]
    fn test_parse_aggregate_select() {
        let query = select(
            "SELECT MIN(tobs), AVG(tobs), MAX(tobs) FROM measurement \
             WHERE date >= '2017-01-01' AND date <= '2017-01-07'",
        );

        assert!(query.is_aggregate());
        assert_eq!(
            query.projection[1],
            SelectItem::Expr {
                expr: SelectExpr::Aggregate {
                    function: AggregateFunction::Avg,
                    column: Some("tobs".into()),
                },
                alias: None,
            }
        );

        let conjuncts = query.where_clause.as_ref().unwrap().conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].1, ComparisonOp::GtEq);
        assert_eq!(conjuncts[1].1, ComparisonOp::LtEq);
    }

    #[test]
    fn test_parse_group_order_limit() {
        let query = select(
            "SELECT station, COUNT(station) AS n FROM measurement \
             GROUP BY station ORDER BY n DESC, station LIMIT 1",
        );

        assert_eq!(query.group_by, vec!["station".to_string()]);
        assert_eq!(query.limit, Some(1));
        assert_eq!(
            query.order_by[0],
            OrderKey {
                expr: SelectExpr::Aggregate {
                    function: AggregateFunction::Count,
                    column: Some("station".into()),
                },
                descending: true,
            }
        );
        assert!(!query.order_by[1].descending);
    }

    #[test]
    fn test_literal_on_left_flips_operator() {
        let query = select("SELECT * FROM measurement WHERE '2017-01-01' <= date");
        assert_eq!(
            query.where_clause,
            Some(WhereClause::Comparison {
                column: "date".into(),
                op: ComparisonOp::GtEq,
                value: Value::Text("2017-01-01".into()),
            })
        );
    }

    #[test]
    fn test_count_star_renders_name() {
        let query = select("SELECT COUNT(*) FROM station");
        match &query.projection[0] {
            SelectItem::Expr { expr, .. } => assert_eq!(expr.to_string(), "COUNT(*)"),
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unsupported_statements() {
        assert!(QueryParser::parse("DELETE FROM station WHERE station = 'x'").is_err());
        assert!(QueryParser::parse("SELECT * FROM measurement WHERE prcp IS NULL").is_err());
        assert!(QueryParser::parse("SELECT 1; SELECT 2").is_err());
    }
}
