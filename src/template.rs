// ABOUTME: Minimal sandboxed template engine for statement and payload rendering
// ABOUTME: Supports {{.name}} substitution and the {{json .name}} escape helper only
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Statement templating.
//!
//! Template parameters are interpolated into a tool's statement or payload
//! *before* execution, distinct from regular parameters bound as data. The
//! language is deliberately tiny (variable substitution and a JSON escape
//! helper), so a template can never evaluate expressions:
//!
//! - `{{.name}}`: substitute the scalar value verbatim
//! - `{{json .name}}`: substitute the value serialized as JSON
//!
//! Plain substitution never escapes the surrounding SQL/document syntax;
//! tools that accept template parameters document that trade-off for
//! identifier-like values. Non-scalar values require the `json` form.

use crate::errors::{AppError, AppResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static TEMPLATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(json\s+)?\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap()
});

/// Render a template against a name → value map.
///
/// # Errors
/// Returns [`AppError::Validation`] for references to missing values and
/// for non-scalar values used without the `json` helper.
pub fn render(template: &str, values: &Map<String, Value>) -> AppResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in TEMPLATE_PATTERN.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let as_json = caps.get(1).is_some();
        let name = &caps[2];
        out.push_str(&template[last..whole.start()]);

        let value = values.get(name).ok_or_else(|| {
            AppError::validation(format!("template references unknown parameter \"{name}\""))
        })?;
        if as_json {
            out.push_str(&serde_json::to_string(value).map_err(AppError::from)?);
        } else {
            out.push_str(&render_scalar(name, value)?);
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn render_scalar(name: &str, value: &Value) -> AppResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => Err(AppError::validation(format!(
            "template parameter \"{name}\" is not a scalar; use {{{{json .{name}}}}}"
        ))),
    }
}

/// Whether a statement contains any template references at all
#[must_use]
pub fn has_references(template: &str) -> bool {
    TEMPLATE_PATTERN.is_match(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_plain_substitution() {
        let rendered = render(
            "SELECT * FROM {{.table}} WHERE id = $1",
            &values(json!({"table": "users"})),
        )
        .unwrap();
        assert_eq!(rendered, "SELECT * FROM users WHERE id = $1");
    }

    #[test]
    fn test_whitespace_tolerated() {
        let rendered = render("{{ .a }}-{{  json .b }}", &values(json!({"a": 1, "b": "x"})))
            .unwrap();
        assert_eq!(rendered, "1-\"x\"");
    }

    #[test]
    fn test_json_helper_escapes() {
        let rendered = render(
            r#"{"filter": {{json .filter}}}"#,
            &values(json!({"filter": {"country": "JP"}})),
        )
        .unwrap();
        assert_eq!(rendered, r#"{"filter": {"country":"JP"}}"#);
    }

    #[test]
    fn test_json_helper_escapes_quotes_in_strings() {
        let rendered =
            render("{{json .s}}", &values(json!({"s": "he said \"hi\""}))).unwrap();
        assert_eq!(rendered, r#""he said \"hi\"""#);
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let err = render("{{.missing}}", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_non_scalar_requires_json_form() {
        let err = render("{{.obj}}", &values(json!({"obj": {"a": 1}}))).unwrap_err();
        assert!(err.to_string().contains("json .obj"));
    }

    #[test]
    fn test_text_without_references_untouched() {
        let stmt = "SELECT 1 WHERE note = '{not a ref}'";
        assert_eq!(render(stmt, &Map::new()).unwrap(), stmt);
        assert!(!has_references(stmt));
    }
}
