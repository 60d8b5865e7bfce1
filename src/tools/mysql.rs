// ABOUTME: MySQL tool kinds executing configured statements and table listing
// ABOUTME: Covers mysql-sql and mysql-list-tables with per-type row conversion
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! MySQL tools. Statements use `?` placeholders bound positionally from
//! the declared parameters.

use super::{BuildContext, InvocationContext, Tool, ToolConfig};
use crate::errors::AppResult;
use crate::parameters::{check_unique_names, ParamValues, Parameter, ParameterType};
use crate::sources::mysql::MySqlSource;
use crate::template;
use async_trait::async_trait;
use base64::Engine as _;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row, TypeInfo};
use std::sync::Arc;

/// `mysql-sql` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MySqlSqlConfig {
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
    let mut config: MySqlSqlConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    for p in config.parameters.iter().chain(&config.template_parameters) {
        p.validate(&config.name)?;
    }
    check_unique_names(&config.name, &config.parameters, &config.template_parameters)?;
    Ok(Box::new(config))
}

impl ToolConfig for MySqlSqlConfig {
    fn kind(&self) -> &'static str {
        "mysql-sql"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<MySqlSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(MySqlSqlTool {
            config: self.clone(),
            source,
        }))
    }
}

/// Executes a configured statement against a mysql source
pub struct MySqlSqlTool {
    config: MySqlSqlConfig,
    source: Arc<MySqlSource>,
}

#[async_trait]
impl Tool for MySqlSqlTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "mysql-sql"
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
        let mut query = sqlx::query(&statement);
        for param in params.iter() {
            query = bind_value(query, &param.value);
        }
        let rows = query.fetch_all(self.source.pool()).await?;
        rows_to_json(&rows)
    }
}

// table_names is bound twice because mysql placeholders are purely
// positional.
const LIST_TABLES: &str = "\
SELECT table_name AS object_name
FROM information_schema.tables
WHERE table_schema = DATABASE()
  AND table_type = 'BASE TABLE'
  AND (? = '' OR FIND_IN_SET(table_name, ?) > 0)
ORDER BY table_name";

/// `mysql-list-tables` prebuilt introspection tool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MySqlListTablesConfig {
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
    let mut config: MySqlListTablesConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for MySqlListTablesConfig {
    fn kind(&self) -> &'static str {
        "mysql-list-tables"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<MySqlSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(MySqlListTablesTool {
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

/// Lists user tables in the configured database
pub struct MySqlListTablesTool {
    config: MySqlListTablesConfig,
    parameters: Vec<Parameter>,
    source: Arc<MySqlSource>,
}

#[async_trait]
impl Tool for MySqlListTablesTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "mysql-list-tables"
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
            .bind(table_names.clone())
            .bind(table_names)
            .fetch_all(self.source.pool())
            .await?;
        rows_to_json(&rows)
    }
}

/// Bind one JSON value; arrays and objects bind as JSON
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
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
    }
}

/// Stream rows into `[{column: value}]` with per-type conversions
fn rows_to_json(rows: &[MySqlRow]) -> AppResult<Value> {
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

fn column_to_json(row: &MySqlRow, index: usize) -> AppResult<Value> {
    let type_name = row.columns()[index].type_info().name().to_string();
    let unsigned = type_name.contains("UNSIGNED");
    let value = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map_or(Value::Null, Value::from),
        name if name.contains("DECIMAL") => row
            .try_get::<Option<rust_decimal::Decimal>, _>(index)?
            .map_or(Value::Null, decimal_to_json),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)?
            .map_or(Value::Null, |v| Value::from(f64::from(v))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.map_or(Value::Null, Value::from),
        "TINYINT" => int_json(row.try_get::<Option<i8>, _>(index)?.map(i64::from)),
        "SMALLINT" => int_json(row.try_get::<Option<i16>, _>(index)?.map(i64::from)),
        "MEDIUMINT" | "INT" => int_json(row.try_get::<Option<i32>, _>(index)?.map(i64::from)),
        "BIGINT" => int_json(row.try_get::<Option<i64>, _>(index)?),
        name if name.contains("INT") && unsigned => row
            .try_get::<Option<u64>, _>(index)?
            .map_or(Value::Null, Value::from),
        "JSON" => row
            .try_get::<Option<Value>, _>(index)?
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map_or(Value::Null, |v| Value::String(v.to_rfc3339())),
        "DATETIME" => row
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
        name if name.contains("BLOB") || name.contains("BINARY") => row
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

fn int_json(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn decimal_to_json(decimal: rust_decimal::Decimal) -> Value {
    if decimal.is_integer() {
        decimal
            .to_i64()
            .map_or_else(|| Value::String(decimal.to_string()), Value::from)
    } else {
        decimal
            .to_f64()
            .map_or_else(|| Value::String(decimal.to_string()), Value::from)
    }
}
