//! `${name}` placeholder scripts.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// A script with its placeholders rewritten to positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Script as written by the view author.
    pub source: String,
    /// Script with every `${name}` replaced by `?`.
    pub text: String,
    /// Placeholder names in order of appearance. Repeats are kept.
    pub params: Vec<String>,
}

impl Query {
    /// Parses `source`. An unterminated `${` is left verbatim.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut text = String::with_capacity(source.len());
        let mut params = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                break;
            };
            text.push_str(&rest[..start]);
            text.push('?');
            params.push(after[..end].to_string());
            rest = &after[end + 1..];
        }
        text.push_str(rest);

        Self {
            source: source.to_string(),
            text,
            params,
        }
    }

    /// Resolves every placeholder through `lookup`. Unresolved ones bind NULL.
    pub fn bind<'a, F>(&'a self, mut lookup: F) -> Vec<SqlValue>
    where
        F: FnMut(&'a str) -> Option<SqlValue>,
    {
        self.params
            .iter()
            .map(|name| lookup(name).unwrap_or(SqlValue::Null))
            .collect()
    }
}

/// Converts a caller-supplied JSON value into a SQL value.
///
/// Arrays and objects bind as their JSON text.
#[must_use]
pub fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
