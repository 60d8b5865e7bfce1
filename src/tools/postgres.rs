// ABOUTME: PostgreSQL tool kinds executing configured and ad-hoc statements
// ABOUTME: Covers postgres-sql, postgres-execute-sql, and the introspection tools
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! PostgreSQL tools.
//!
//! `postgres-sql` executes a configured statement with `$n` placeholders
//! bound positionally from the declared parameters:
//!
//! ```yaml
//! tools:
//!   example:
//!     kind: postgres-sql
//!     source: my-pg
//!     description: rows by country
//!     statement: SELECT * FROM t WHERE country = $1
//!     parameters:
//!       - name: country
//!         type: string
//! ```
//!
//! Template parameters are rendered into the statement before binding;
//! tools that declare them accept the injection trade-off for
//! identifier-like values.

use super::{BuildContext, InvocationContext, Tool, ToolConfig};
use crate::errors::{AppError, AppResult};
use crate::parameters::{check_unique_names, ParamValues, Parameter, ParameterType};
use crate::sources::postgres::PostgresSource;
use crate::template;
use async_trait::async_trait;
use base64::Engine as _;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo};
use std::sync::Arc;

/// `postgres-sql` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostgresSqlConfig {
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
    let mut config: PostgresSqlConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    for p in config.parameters.iter().chain(&config.template_parameters) {
        p.validate(&config.name)?;
    }
    check_unique_names(&config.name, &config.parameters, &config.template_parameters)?;
    Ok(Box::new(config))
}

impl ToolConfig for PostgresSqlConfig {
    fn kind(&self) -> &'static str {
        "postgres-sql"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source =
            ctx.typed_source::<PostgresSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(PostgresSqlTool {
            config: self.clone(),
            source,
        }))
    }
}

/// Executes a configured statement against a postgres source
pub struct PostgresSqlTool {
    config: PostgresSqlConfig,
    source: Arc<PostgresSource>,
}

#[async_trait]
impl Tool for PostgresSqlTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "postgres-sql"
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

/// `postgres-execute-sql` tool configuration; the statement arrives as the
/// well-known `sql` parameter instead of the config
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostgresExecuteSqlConfig {
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
    let mut config: PostgresExecuteSqlConfig =
        crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for PostgresExecuteSqlConfig {
    fn kind(&self) -> &'static str {
        "postgres-execute-sql"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source =
            ctx.typed_source::<PostgresSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(PostgresExecuteSqlTool {
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
pub struct PostgresExecuteSqlTool {
    config: PostgresExecuteSqlConfig,
    parameters: Vec<Parameter>,
    source: Arc<PostgresSource>,
}

#[async_trait]
impl Tool for PostgresExecuteSqlTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "postgres-execute-sql"
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

const LIST_TABLES_SIMPLE: &str = "\
SELECT t.table_name AS object_name
FROM information_schema.tables t
WHERE t.table_type = 'BASE TABLE'
  AND t.table_schema NOT IN ('pg_catalog', 'information_schema')
  AND ($1 = '' OR t.table_name = ANY(string_to_array($1, ',')))
ORDER BY t.table_name";

const LIST_TABLES_DETAILED: &str = "\
SELECT t.table_schema AS schema_name,
       t.table_name AS object_name,
       json_agg(json_build_object(
           'column_name', c.column_name,
           'data_type', c.data_type,
           'is_nullable', c.is_nullable,
           'ordinal_position', c.ordinal_position
       ) ORDER BY c.ordinal_position) AS columns
FROM information_schema.tables t
JOIN information_schema.columns c
  ON c.table_schema = t.table_schema AND c.table_name = t.table_name
WHERE t.table_type = 'BASE TABLE'
  AND t.table_schema NOT IN ('pg_catalog', 'information_schema')
  AND ($1 = '' OR t.table_name = ANY(string_to_array($1, ',')))
GROUP BY t.table_schema, t.table_name
ORDER BY t.table_schema, t.table_name";

/// `postgres-list-tables` prebuilt introspection tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostgresListTablesConfig {
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
    let mut config: PostgresListTablesConfig =
        crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for PostgresListTablesConfig {
    fn kind(&self) -> &'static str {
        "postgres-list-tables"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source =
            ctx.typed_source::<PostgresSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(PostgresListTablesTool {
            config: self.clone(),
            parameters: vec![
                Parameter::new(
                    "table_names",
                    ParameterType::String,
                    "Comma-separated table names; empty lists every table.",
                )
                .with_default(Value::String(String::new())),
                Parameter::new(
                    "output_format",
                    ParameterType::String,
                    "Either \"simple\" (names only) or \"detailed\" (with columns).",
                )
                .with_default(Value::String("detailed".to_string())),
            ],
            source,
        }))
    }
}

/// Lists user tables with optional column detail
pub struct PostgresListTablesTool {
    config: PostgresListTablesConfig,
    parameters: Vec<Parameter>,
    source: Arc<PostgresSource>,
}

#[async_trait]
impl Tool for PostgresListTablesTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "postgres-list-tables"
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
        let statement = match params.get("output_format").and_then(Value::as_str) {
            Some("simple") => LIST_TABLES_SIMPLE,
            Some("detailed") | None => LIST_TABLES_DETAILED,
            Some(other) => {
                return Err(AppError::validation(format!(
                    "unable to parse value for \"output_format\": unknown format \"{other}\""
                )))
            }
        };
        let rows = sqlx::query(statement)
            .bind(table_names)
            .fetch_all(self.source.pool())
            .await?;
        rows_to_json(&rows)
    }
}

const LIST_SCHEMAS: &str = "\
SELECT schema_name
FROM information_schema.schemata
WHERE schema_name NOT IN ('pg_catalog', 'information_schema')
ORDER BY schema_name";

/// `postgres-list-schemas` prebuilt introspection tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostgresListSchemasConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default = "default_list_schemas_description")]
    pub description: String,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_list_schemas_description() -> String {
    "List non-system schemas in the database.".to_string()
}

pub(crate) fn decode_list_schemas_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: PostgresListSchemasConfig =
        crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for PostgresListSchemasConfig {
    fn kind(&self) -> &'static str {
        "postgres-list-schemas"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source =
            ctx.typed_source::<PostgresSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(PostgresListSchemasTool {
            config: self.clone(),
            source,
        }))
    }
}

/// Lists non-system schemas
pub struct PostgresListSchemasTool {
    config: PostgresListSchemasConfig,
    source: Arc<PostgresSource>,
}

#[async_trait]
impl Tool for PostgresListSchemasTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "postgres-list-schemas"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &[]
    }

    fn auth_required(&self) -> &[String] {
        &self.config.auth_required
    }

    async fn invoke(
        &self,
        ctx: &InvocationContext,
        _params: ParamValues,
        _template_params: ParamValues,
    ) -> AppResult<Value> {
        ctx.check_deadline()?;
        let rows = sqlx::query(LIST_SCHEMAS)
            .fetch_all(self.source.pool())
            .await?;
        rows_to_json(&rows)
    }
}

async fn run_statement(
    pool: &sqlx::PgPool,
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

/// Bind one JSON value using the closest native postgres type
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> AppResult<Query<'q, Postgres, PgArguments>> {
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
        Value::Array(elements) => bind_array(query, elements),
        Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
    })
}

fn bind_array<'q>(
    query: Query<'q, Postgres, PgArguments>,
    elements: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    if elements.iter().all(Value::is_string) {
        let values: Vec<String> = elements
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        query.bind(values)
    } else if elements.iter().all(Value::is_i64) {
        let values: Vec<i64> = elements.iter().filter_map(Value::as_i64).collect();
        query.bind(values)
    } else if elements.iter().all(Value::is_number) {
        let values: Vec<f64> = elements.iter().filter_map(Value::as_f64).collect();
        query.bind(values)
    } else if elements.iter().all(Value::is_boolean) {
        let values: Vec<bool> = elements.iter().filter_map(Value::as_bool).collect();
        query.bind(values)
    } else {
        query.bind(sqlx::types::Json(Value::Array(elements.to_vec())))
    }
}

/// Stream rows into `[{column: value}]` with per-type conversions
fn rows_to_json(rows: &[PgRow]) -> AppResult<Value> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut object = Map::new();
        for (index, column) in row.columns().iter().enumerate() {
            object.insert(column.name().to_string(), column_to_json(row, index)?);
        }
        out.push(Value::Object(object));
    }
    Ok(Value::Array(out))
}

fn column_to_json(row: &PgRow, index: usize) -> AppResult<Value> {
    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map_or(Value::Null, Value::from),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map_or(Value::Null, |v| Value::from(i64::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map_or(Value::Null, |v| Value::from(i64::from(v))),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map_or(Value::Null, Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map_or(Value::Null, |v| Value::from(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map_or(Value::Null, Value::from),
        // Numeric scale detection: integral values surface as integers
        "NUMERIC" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(index)?
            .map_or(Value::Null, decimal_to_json),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(index)?
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map_or(Value::Null, |v| {
                Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map_or(Value::Null, |v| {
                Value::String(base64::engine::general_purpose::STANDARD.encode(v))
            }),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::String))
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

fn decimal_to_json(decimal: rust_decimal::Decimal) -> Value {
    if decimal.is_integer() {
        decimal.to_i64().map_or_else(
            || Value::String(decimal.to_string()),
            Value::from,
        )
    } else {
        decimal.to_f64().map_or_else(
            || Value::String(decimal.to_string()),
            Value::from,
        )
    }
}
