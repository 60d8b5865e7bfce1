// ABOUTME: SQLite tool kinds executing configured and ad-hoc statements
// ABOUTME: Covers sqlite-sql, sqlite-execute-sql, and sqlite-list-tables
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! SQLite tools. Statements use `?` (or `?N`) placeholders bound
//! positionally from the declared parameters.

use super::{BuildContext, InvocationContext, Tool, ToolConfig};
use crate::errors::{AppError, AppResult};
use crate::parameters::{check_unique_names, ParamValues, Parameter, ParameterType};
use crate::sources::sqlite::SqliteSource;
use crate::template;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo};
use std::sync::Arc;

/// `sqlite-sql` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SqliteSqlConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default)]
    pub description: String,
    pub statement: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub template_parameters: Vec<Parameter>,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

pub(crate) fn decode_sql_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: SqliteSqlConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    for p in config.parameters.iter().chain(&config.template_parameters) {
        p.validate(&config.name)?;
    }
    check_unique_names(&config.name, &config.parameters, &config.template_parameters)?;
    Ok(Box::new(config))
}

impl ToolConfig for SqliteSqlConfig {
    fn kind(&self) -> &'static str {
        "sqlite-sql"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<SqliteSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(SqliteSqlTool {
            config: self.clone(),
            source,
        }))
    }
}

/// Executes a configured statement against a sqlite source
pub struct SqliteSqlTool {
    config: SqliteSqlConfig,
    source: Arc<SqliteSource>,
}

#[async_trait]
impl Tool for SqliteSqlTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "sqlite-sql"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.config.parameters
    }

    fn template_parameters(&self) -> &[Parameter] {
        &self.config.template_parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: ParamValues,
        template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;
        let statement = if self.config.template_parameters.is_empty() {
            self.config.statement.clone()
        } else {
            template::render(&self.config.statement, &template_params.as_map())?
        };
        run_statement(self.source.pool(), &statement, &params).await
    }
}

/// `sqlite-execute-sql` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SqliteExecuteSqlConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default = "default_execute_sql_description")]
    pub description: String,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_execute_sql_description() -> String {
    "Execute an arbitrary SQL statement against the source.".to_string()
}

pub(crate) fn decode_execute_sql_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: SqliteExecuteSqlConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for SqliteExecuteSqlConfig {
    fn kind(&self) -> &'static str {
        "sqlite-execute-sql"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<SqliteSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(SqliteExecuteSqlTool {
            config: self.clone(),
            parameters: vec![Parameter::new(
                "sql",
                ParameterType::String,
                "The SQL statement to execute.",
            )],
            source,
        }))
    }
}

/// Executes an ad-hoc statement supplied at invocation time
pub struct SqliteExecuteSqlTool {
    config: SqliteExecuteSqlConfig,
    parameters: Vec<Parameter>,
    source: Arc<SqliteSource>,
}

#[async_trait]
impl Tool for SqliteExecuteSqlTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "sqlite-execute-sql"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: ParamValues,
        _template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;
        let statement = params
            .get("sql")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("parameter sql is required"))?
            .to_string();
        run_statement(self.source.pool(), &statement, &ParamValues::default()).await
    }
}

// ?1 is referenced twice so the filter binds a single parameter.
const LIST_TABLES: &str = "\
SELECT name AS object_name
FROM sqlite_master
WHERE type = 'table'
  AND name NOT LIKE 'sqlite_%'
  AND (?1 = '' OR instr(',' || ?1 || ',', ',' || name || ',') > 0)
ORDER BY name";

/// `sqlite-list-tables` prebuilt introspection tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SqliteListTablesConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default = "default_list_tables_description")]
    pub description: String,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_list_tables_description() -> String {
    "List user tables. An empty table_names filter returns all tables.".to_string()
}

pub(crate) fn decode_list_tables_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: SqliteListTablesConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for SqliteListTablesConfig {
    fn kind(&self) -> &'static str {
        "sqlite-list-tables"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<SqliteSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(SqliteListTablesTool {
            config: self.clone(),
            parameters: vec![Parameter::new(
                "table_names",
                ParameterType::String,
                "Comma-separated table names; empty lists every table.",
            )
            .with_default(Value::String(String::new()))],
            source,
        }))
    }
}

/// Lists user tables
pub struct SqliteListTablesTool {
    config: SqliteListTablesConfig,
    parameters: Vec<Parameter>,
    source: Arc<SqliteSource>,
}

#[async_trait]
impl Tool for SqliteListTablesTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "sqlite-list-tables"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        params: ParamValues,
        _template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;
        let table_names = params
            .get("table_names")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let rows = sqlx::query(LIST_TABLES)
            .bind(table_names)
            .fetch_all(self.source.pool())
            .await?;
        rows_to_json(&rows)
    }
}

async fn run_statement(
    pool: &sqlx::SqlitePool,
    statement: &str,
    params: &ParamValues,
) -> AppResult<Value> {
    let mut query = sqlx::query(statement);
    for param in params.iter() {
        query = bind_value(query, &param.value)?;
    }
    let rows = query.fetch_all(pool).await?;
    rows_to_json(&rows)
}

/// Bind one JSON value; arrays and objects bind as JSON text
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> AppResult<Query<'q, Sqlite, SqliteArguments<'q>>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
    })
}

/// Stream rows into `[{column: value}]`, honoring sqlite's loose typing
fn rows_to_json(rows: &[SqliteRow]) -> AppResult<Value> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut object = Map::new();
        for (index, column) in row.columns().iter().enumerate() {
            object.insert(column.name().to_string(), column_to_json(row, index));
        }
        out.push(Value::Object(object));
    }
    Ok(Value::Array(out))
}

fn column_to_json(row: &SqliteRow, index: usize) -> Value {
    let declared = row.columns()[index].type_info().name().to_string();
    match declared.as_str() {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::from),
        "INTEGER" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::from),
        "REAL" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::from),
        "TEXT" | "VARCHAR" | "DATETIME" => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::String),
        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| {
                Value::String(base64::engine::general_purpose::STANDARD.encode(v))
            }),
        _ => dynamic_column_to_json(row, index),
    }
}

// Expression columns carry no useful declared type; probe the common
// storage classes in order.
fn dynamic_column_to_json(row: &SqliteRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(Value::Null, Value::String);
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map_or(Value::Null, |v| {
            Value::String(base64::engine::general_purpose::STANDARD.encode(v))
        })
}
