// ABOUTME: MongoDB document tool kinds for templated finds and bulk inserts
// ABOUTME: Renders extended-JSON payloads and marshals results back to plain JSON
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! MongoDB document tools.
//!
//! `mongodb-find` renders a templated extended-JSON filter (plus optional
//! projection and sort payloads) against a collection:
//!
//! ```yaml
//! tools:
//!   find-orders:
//!     kind: mongodb-find
//!     source: docs
//!     collection: orders
//!     filterPayload: '{ "country": {{json .country}} }'
//!     parameters:
//!       - name: country
//!         type: string
//! ```
//!
//! Parameters substitute into the payloads through the template engine;
//! these tools document JSON injection, so the `{{json .name}}` form is
//! safe for any declared type. Results are marshaled through relaxed
//! extended JSON into plain JSON.

use super::{BuildContext, InvocationContext, Tool, ToolConfig};
use crate::errors::{AppError, AppResult};
use crate::parameters::{check_unique_names, ParamValues, Parameter, ParameterType};
use crate::sources::mongodb::MongoSource;
use crate::template;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// `mongodb-find` tool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MongoFindConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default)]
    pub description: String,
    pub collection: String,
    /// Extended-JSON filter template
    pub filter_payload: String,
    /// Optional extended-JSON projection template
    #[serde(default)]
    pub projection_payload: Option<String>,
    /// Optional extended-JSON sort template
    #[serde(default)]
    pub sort_payload: Option<String>,
    /// Maximum number of documents returned (0 = unlimited)
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

pub(crate) fn decode_find_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: MongoFindConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    for p in &config.parameters {
        p.validate(&config.name)?;
    }
    check_unique_names(&config.name, &config.parameters, &[])?;
    Ok(Box::new(config))
}

impl ToolConfig for MongoFindConfig {
    fn kind(&self) -> &'static str {
        "mongodb-find"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<MongoSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(MongoFindTool {
            config: self.clone(),
            source,
        }))
    }
}

/// Runs a templated find against a collection
pub struct MongoFindTool {
    config: MongoFindConfig,
    source: Arc<MongoSource>,
}

#[async_trait]
impl Tool for MongoFindTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "mongodb-find"
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.config.parameters
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
        let values = params.as_map();
        let filter = render_document(&self.config.filter_payload, &values)?;
        let collection = self
            .source
            .database()
            .collection::<Document>(&self.config.collection);

        let mut find = collection.find(filter);
        if let Some(payload) = &self.config.projection_payload {
            find = find.projection(render_document(payload, &values)?);
        }
        if let Some(payload) = &self.config.sort_payload {
            find = find.sort(render_document(payload, &values)?);
        }
        if self.config.limit > 0 {
            find = find.limit(self.config.limit);
        }

        let cursor = find
            .await
            .map_err(|e| AppError::backend(format!("mongodb find failed: {e}")))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| AppError::backend(format!("mongodb cursor failed: {e}")))?;

        let out = documents
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect();
        Ok(Value::Array(out))
    }
}

/// `mongodb-insert-many` tool configuration; documents arrive as the
/// well-known `data` parameter holding a JSON array
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MongoInsertManyConfig {
    #[serde(skip)]
    pub(crate) name: String,
    pub source: String,
    #[serde(default = "default_insert_many_description")]
    pub description: String,
    pub collection: String,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

fn default_insert_many_description() -> String {
    "Insert a JSON array of documents into the collection.".to_string()
}

pub(crate) fn decode_insert_many_config(
    name: &str,
    value: serde_yaml::Value,
) -> AppResult<Box<dyn ToolConfig>> {
    let mut config: MongoInsertManyConfig = crate::registry::decode_entry("tools", name, value)?;
    config.name = name.to_string();
    Ok(Box::new(config))
}

impl ToolConfig for MongoInsertManyConfig {
    fn kind(&self) -> &'static str {
        "mongodb-insert-many"
    }

    fn initialize(&self, ctx: &BuildContext<'_>) -> AppResult<Arc<dyn Tool>> {
        ctx.check_auth_services(&self.name, &self.auth_required)?;
        let source = ctx.typed_source::<MongoSource>(&self.name, self.kind(), &self.source)?;
        Ok(Arc::new(MongoInsertManyTool {
            config: self.clone(),
            parameters: vec![Parameter::new(
                "data",
                ParameterType::String,
                "JSON array of documents to insert.",
            )],
            source,
        }))
    }
}

/// Inserts a batch of documents and returns the generated ids
pub struct MongoInsertManyTool {
    config: MongoInsertManyConfig,
    parameters: Vec<Parameter>,
    source: Arc<MongoSource>,
}

#[async_trait]
impl Tool for MongoInsertManyTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> &'static str {
        "mongodb-insert-many"
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
        let data = params
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::validation("parameter data is required"))?;
        let documents = parse_documents(data)?;

        let collection = self
            .source
            .database()
            .collection::<Document>(&self.config.collection);
        let result = collection
            .insert_many(documents)
            .await
            .map_err(|e| AppError::backend(format!("mongodb insert failed: {e}")))?;

        let ids: Vec<Value> = result
            .inserted_ids
            .into_values()
            .map(Bson::into_relaxed_extjson)
            .collect();
        Ok(Value::Array(ids))
    }
}

fn parse_documents(data: &str) -> AppResult<Vec<Document>> {
    let json: Value = serde_json::from_str(data)
        .map_err(|e| AppError::validation(format!("parameter data is not valid JSON: {e}")))?;
    let Value::Array(elements) = json else {
        return Err(AppError::validation("parameter data must be a JSON array"));
    };
    elements
        .into_iter()
        .map(|element| json_to_document(&element))
        .collect()
}

fn render_document(payload: &str, values: &serde_json::Map<String, Value>) -> AppResult<Document> {
    let rendered = template::render(payload, values)?;
    let json: Value = serde_json::from_str(&rendered).map_err(|e| {
        AppError::validation(format!("rendered payload is not valid JSON: {e}"))
    })?;
    json_to_document(&json)
}

// Extended-JSON operators ($date, $oid, ...) survive this conversion.
fn json_to_document(json: &Value) -> AppResult<Document> {
    let bson = Bson::try_from(json.clone())
        .map_err(|e| AppError::validation(format!("payload is not valid extended JSON: {e}")))?;
    match bson {
        Bson::Document(document) => Ok(document),
        _ => Err(AppError::validation("payload must be a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_filter_with_json_escape() {
        let mut values = serde_json::Map::new();
        values.insert("country".to_string(), json!("JP"));
        let document =
            render_document(r#"{ "country": {{json .country}} }"#, &values).unwrap();
        assert_eq!(document.get_str("country").unwrap(), "JP");
    }

    #[test]
    fn test_render_rejects_non_object_payload() {
        let err = render_document("[1, 2]", &serde_json::Map::new()).unwrap_err();
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn test_extended_json_oid_survives() {
        let document = render_document(
            r#"{ "_id": { "$oid": "507f1f77bcf86cd799439011" } }"#,
            &serde_json::Map::new(),
        )
        .unwrap();
        assert!(matches!(document.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_parse_documents_requires_array() {
        assert!(parse_documents(r#"[{"a": 1}, {"b": 2}]"#).unwrap().len() == 2);
        assert!(parse_documents(r#"{"a": 1}"#).is_err());
        assert!(parse_documents("not json").is_err());
    }
}
