//! View commands.

use super::{print_json, CommandResult};
use kdb_core::{Engine, SelectParams};
use serde_json::Value;

/// Runs a select and prints its result.
pub fn select(
    engine: &Engine,
    db: &str,
    ddoc: &str,
    view: &str,
    select: &str,
    params: &[String],
    stale: bool,
) -> CommandResult {
    let db = engine.database(db)?;
    let params = parse_params(params)?;
    print_json(&db.select_view(ddoc, view, select, &params, stale)?)
}

/// Parses `name=value` pairs; values that are not valid JSON stay strings.
pub fn parse_params(raw: &[String]) -> Result<SelectParams, String> {
    raw.iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected name=value, got {pair:?}"))?;
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_parse_json_or_string() {
        let params = parse_params(&["n=3".into(), "key=abc".into(), "q=\"x\"".into()]).unwrap();
        assert_eq!(params["n"], json!(3));
        assert_eq!(params["key"], json!("abc"));
        assert_eq!(params["q"], json!("x"));
    }

    #[test]
    fn params_need_equals() {
        assert!(parse_params(&["oops".into()]).is_err());
    }
}
