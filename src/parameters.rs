// ABOUTME: Typed tool parameter descriptors, parsing, and manifest projection
// ABOUTME: Handles type coercion, defaults, and authentication-claim substitution
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Parameter Model
//!
//! Every tool declares an ordered list of [`Parameter`] descriptors. At
//! invocation time the pipeline resolves each descriptor to a concrete
//! value, in declaration order:
//!
//! 1. Claim-backed parameters (`authServices` non-empty) read the first
//!    configured service whose verified claim map contains the named field.
//!    They never read the request body.
//! 2. Everything else reads the request body, falling back to the declared
//!    default when absent.
//! 3. Values are coerced against the declared type: integers accept JSON
//!    numbers with zero fractional part, floats accept integers, bools
//!    accept only bools, arrays recurse per item descriptor.
//!
//! The realized [`ParamValues`] preserves declaration order for positional
//! SQL binding and template rendering.

use crate::auth::ClaimMap;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Parameter value types supported by the configuration schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// UTF-8 string
    String,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Bool,
    /// Homogeneous array described by `items`
    Array,
    /// Free-form JSON object (`additionalProperties: true`)
    Object,
}

impl ParameterType {
    /// The JSON Schema type string used in MCP manifests
    #[must_use]
    pub const fn json_schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Config-facing name of the type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Reference to an auth service claim that supplies a parameter value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterAuthService {
    /// Configured auth service name
    #[serde(alias = "authServiceName")]
    pub name: String,
    /// Claim to read from the verified token
    #[serde(alias = "claimName")]
    pub field: String,
}

/// A single tool parameter descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Parameter {
    /// Parameter name, unique within the tool
    pub name: String,
    /// Declared value type
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Human-readable description surfaced in manifests
    #[serde(default)]
    pub description: String,
    /// Whether the parameter must resolve to a value (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Default applied when the request omits the parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Item descriptor for array parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Parameter>>,
    /// Claim sources; non-empty means the value comes from a verified token
    #[serde(default, alias = "authSources", skip_serializing_if = "Vec::is_empty")]
    pub auth_services: Vec<ParameterAuthService>,
}

impl Parameter {
    /// Construct a plain required parameter (used by prebuilt tools)
    #[must_use]
    pub fn new(name: &str, param_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: None,
            default: None,
            items: None,
            auth_services: Vec::new(),
        }
    }

    /// Attach a default value, making the parameter effectively optional
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// A parameter is required unless it declares a default or opts out
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none() && self.required.unwrap_or(true)
    }

    /// Validate structural invariants that serde cannot express
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for array parameters without an item
    /// descriptor and for type-incompatible defaults.
    pub fn validate(&self, owner: &str) -> AppResult<()> {
        if self.param_type == ParameterType::Array && self.items.is_none() {
            return Err(AppError::config(format!(
                "{owner}/{}: array parameter requires \"items\"",
                self.name
            )));
        }
        if let Some(items) = &self.items {
            items.validate(owner)?;
        }
        if let Some(default) = &self.default {
            coerce_value(self, default.clone()).map_err(|e| {
                AppError::config(format!("{owner}/{}: invalid default: {e}", self.name))
            })?;
        }
        Ok(())
    }
}

/// A resolved parameter value
#[derive(Debug, Clone)]
pub struct ParamValue {
    /// Descriptor name
    pub name: String,
    /// Coerced JSON value
    pub value: Value,
}

/// Realized parameter list, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ParamValues(pub Vec<ParamValue>);

impl ParamValues {
    /// Look up a value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Project into a name → value map for template rendering
    #[must_use]
    pub fn as_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    /// Values in declaration order, for positional binding
    pub fn iter(&self) -> impl Iterator<Item = &ParamValue> {
        self.0.iter()
    }

    /// Number of resolved values
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no values were resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve the declared parameters against a request body and the
/// per-service verified claim maps.
///
/// # Errors
/// Returns [`AppError::Validation`] for missing required values, missing
/// required claims, and type mismatches.
pub fn parse_params(
    descriptors: &[Parameter],
    body: &Map<String, Value>,
    claims: &HashMap<String, ClaimMap>,
) -> AppResult<ParamValues> {
    let mut values = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if let Some(value) = resolve_param(descriptor, body, claims)? {
            values.push(ParamValue {
                name: descriptor.name.clone(),
                value,
            });
        }
    }
    Ok(ParamValues(values))
}

fn resolve_param(
    descriptor: &Parameter,
    body: &Map<String, Value>,
    claims: &HashMap<String, ClaimMap>,
) -> AppResult<Option<Value>> {
    // Claim-backed parameters never read the request body.
    if !descriptor.auth_services.is_empty() {
        for service in &descriptor.auth_services {
            if let Some(value) = claims
                .get(&service.name)
                .and_then(|claim_map| claim_map.get(&service.field))
            {
                return coerce_value(descriptor, value.clone()).map(Some);
            }
        }
        if descriptor.is_required() {
            return Err(AppError::validation(format!(
                "parameter {} missing required claim",
                descriptor.name
            )));
        }
        return Ok(descriptor.default.clone());
    }

    match body.get(&descriptor.name) {
        Some(value) => coerce_value(descriptor, value.clone()).map(Some),
        None => {
            if let Some(default) = &descriptor.default {
                return Ok(Some(default.clone()));
            }
            if descriptor.is_required() {
                return Err(AppError::validation(format!(
                    "parameter {} is required",
                    descriptor.name
                )));
            }
            Ok(None)
        }
    }
}

/// Coerce a JSON value against a descriptor, rejecting incompatible types
///
/// # Errors
/// Returns [`AppError::Validation`] when the value's JSON type does not
/// match the declared parameter type.
pub fn coerce_value(descriptor: &Parameter, value: Value) -> AppResult<Value> {
    let mismatch = || {
        AppError::validation(format!(
            "unable to parse value for \"{}\": expected {}",
            descriptor.name,
            descriptor.param_type.as_str()
        ))
    };
    match descriptor.param_type {
        ParameterType::String => match value {
            Value::String(_) => Ok(value),
            _ => Err(mismatch()),
        },
        ParameterType::Int => match &value {
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Ok(value)
                } else {
                    // Accept floats with a zero fractional part
                    let f = n.as_f64().ok_or_else(mismatch)?;
                    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
                        #[allow(clippy::cast_possible_truncation)]
                        Ok(Value::from(f as i64))
                    } else {
                        Err(mismatch())
                    }
                }
            }
            _ => Err(mismatch()),
        },
        ParameterType::Float => match &value {
            Value::Number(_) => Ok(value),
            _ => Err(mismatch()),
        },
        ParameterType::Bool => match value {
            Value::Bool(_) => Ok(value),
            _ => Err(mismatch()),
        },
        ParameterType::Array => match value {
            Value::Array(elements) => {
                let items = descriptor.items.as_ref().ok_or_else(|| {
                    AppError::validation(format!(
                        "array parameter \"{}\" has no item descriptor",
                        descriptor.name
                    ))
                })?;
                let coerced = elements
                    .into_iter()
                    .map(|element| coerce_value(items, element))
                    .collect::<AppResult<Vec<_>>>()?;
                Ok(Value::Array(coerced))
            }
            _ => Err(mismatch()),
        },
        ParameterType::Object => match value {
            Value::Object(_) => Ok(value),
            _ => Err(mismatch()),
        },
    }
}

/// JSON-safe manifest projection of a parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterManifest {
    /// Parameter name
    pub name: String,
    /// Config-facing type string
    #[serde(rename = "type")]
    pub param_type: String,
    /// Human-readable description
    pub description: String,
    /// Whether clients must supply a value
    pub required: bool,
    /// Declared default, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Item manifest for array parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterManifest>>,
    /// Names of auth services that can supply this parameter
    #[serde(rename = "authSources")]
    pub auth_sources: Vec<String>,
}

impl From<&Parameter> for ParameterManifest {
    fn from(p: &Parameter) -> Self {
        Self {
            name: p.name.clone(),
            param_type: p.param_type.as_str().to_string(),
            description: p.description.clone(),
            required: p.is_required(),
            default: p.default.clone(),
            items: p.items.as_deref().map(|i| Box::new(Self::from(i))),
            auth_sources: p.auth_services.iter().map(|s| s.name.clone()).collect(),
        }
    }
}

/// Check that parameter names are unique across both descriptor lists
///
/// # Errors
/// Returns [`AppError::Config`] on the first duplicate name.
pub fn check_unique_names(
    owner: &str,
    parameters: &[Parameter],
    template_parameters: &[Parameter],
) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for p in parameters.iter().chain(template_parameters) {
        if !seen.insert(p.name.as_str()) {
            return Err(AppError::config(format!(
                "{owner}/{}: duplicate parameter name",
                p.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_identity_on_legal_values() {
        let p = Parameter::new("country", ParameterType::String, "");
        assert_eq!(
            coerce_value(&p, json!("JP")).unwrap(),
            json!("JP")
        );
        let p = Parameter::new("n", ParameterType::Int, "");
        assert_eq!(coerce_value(&p, json!(42)).unwrap(), json!(42));
        let p = Parameter::new("x", ParameterType::Float, "");
        assert_eq!(coerce_value(&p, json!(1.5)).unwrap(), json!(1.5));
        let p = Parameter::new("b", ParameterType::Bool, "");
        assert_eq!(coerce_value(&p, json!(true)).unwrap(), json!(true));
    }

    #[test]
    fn test_int_accepts_zero_fraction_float() {
        let p = Parameter::new("n", ParameterType::Int, "");
        assert_eq!(coerce_value(&p, json!(7.0)).unwrap(), json!(7));
        assert!(coerce_value(&p, json!(7.5)).is_err());
    }

    #[test]
    fn test_float_accepts_int() {
        let p = Parameter::new("x", ParameterType::Float, "");
        assert_eq!(coerce_value(&p, json!(3)).unwrap(), json!(3));
    }

    #[test]
    fn test_bool_rejects_truthy_strings() {
        let p = Parameter::new("b", ParameterType::Bool, "");
        assert!(coerce_value(&p, json!("true")).is_err());
        assert!(coerce_value(&p, json!(1)).is_err());
    }

    #[test]
    fn test_nested_array_coercion() {
        let mut inner = Parameter::new("row", ParameterType::Array, "");
        inner.items = Some(Box::new(Parameter::new("cell", ParameterType::Int, "")));
        let mut p = Parameter::new("grid", ParameterType::Array, "");
        p.items = Some(Box::new(inner));
        assert_eq!(
            coerce_value(&p, json!([[1, 2], [3]])).unwrap(),
            json!([[1, 2], [3]])
        );
        assert!(coerce_value(&p, json!([[1, "x"]])).is_err());
    }

    #[test]
    fn test_missing_required_parameter() {
        let descriptors = vec![Parameter::new("country", ParameterType::String, "")];
        let err = parse_params(&descriptors, &Map::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "parameter country is required");
    }

    #[test]
    fn test_default_materializes_only_when_absent() {
        let descriptors =
            vec![Parameter::new("limit", ParameterType::Int, "").with_default(json!(10))];
        let values = parse_params(&descriptors, &Map::new(), &HashMap::new()).unwrap();
        assert_eq!(values.get("limit"), Some(&json!(10)));

        let values =
            parse_params(&descriptors, &body(json!({"limit": 3})), &HashMap::new()).unwrap();
        assert_eq!(values.get("limit"), Some(&json!(3)));
    }

    #[test]
    fn test_claim_backed_parameter_ignores_body() {
        let mut p = Parameter::new("id", ParameterType::Int, "");
        p.auth_services = vec![ParameterAuthService {
            name: "g".to_string(),
            field: "user_id".to_string(),
        }];
        let descriptors = vec![p];

        let mut claim_map = ClaimMap::new();
        claim_map.insert("user_id".to_string(), json!(42));
        let mut claims = HashMap::new();
        claims.insert("g".to_string(), claim_map);

        // Body value is ignored in favor of the claim.
        let values =
            parse_params(&descriptors, &body(json!({"id": 7})), &claims).unwrap();
        assert_eq!(values.get("id"), Some(&json!(42)));

        let err = parse_params(&descriptors, &body(json!({"id": 7})), &HashMap::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "parameter id missing required claim");
    }

    #[test]
    fn test_claim_service_order_first_match_wins() {
        let mut p = Parameter::new("email", ParameterType::String, "");
        p.auth_services = vec![
            ParameterAuthService {
                name: "a".to_string(),
                field: "email".to_string(),
            },
            ParameterAuthService {
                name: "b".to_string(),
                field: "email".to_string(),
            },
        ];
        let descriptors = vec![p];

        let mut claims = HashMap::new();
        let mut map_a = ClaimMap::new();
        map_a.insert("email".to_string(), json!("a@example.com"));
        claims.insert("a".to_string(), map_a);
        let mut map_b = ClaimMap::new();
        map_b.insert("email".to_string(), json!("b@example.com"));
        claims.insert("b".to_string(), map_b);

        let values = parse_params(&descriptors, &Map::new(), &claims).unwrap();
        assert_eq!(values.get("email"), Some(&json!("a@example.com")));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let descriptors = vec![
            Parameter::new("b", ParameterType::String, ""),
            Parameter::new("a", ParameterType::String, ""),
        ];
        let values = parse_params(
            &descriptors,
            &body(json!({"a": "1", "b": "2"})),
            &HashMap::new(),
        )
        .unwrap();
        let names: Vec<_> = values.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_manifest_projection() {
        let mut p = Parameter::new("tags", ParameterType::Array, "tag filter");
        p.items = Some(Box::new(Parameter::new("tag", ParameterType::String, "")));
        p.default = Some(json!([]));
        let manifest = ParameterManifest::from(&p);
        assert_eq!(manifest.param_type, "array");
        assert!(!manifest.required);
        assert_eq!(manifest.items.unwrap().param_type, "string");
    }

    #[test]
    fn test_yaml_descriptor_roundtrip() {
        let yaml = r"
name: country
type: string
description: country code
";
        let p: Parameter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.name, "country");
        assert_eq!(p.param_type, ParameterType::String);
        assert!(p.is_required());
    }

    #[test]
    fn test_auth_service_alias_fields() {
        let yaml = r"
name: id
type: int
authServices:
  - authServiceName: g
    claimName: user_id
";
        let p: Parameter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.auth_services[0].name, "g");
        assert_eq!(p.auth_services[0].field, "user_id");
    }
}
