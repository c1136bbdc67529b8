//! SQL text helpers: identifier quoting and literal rendering.
use serde_json::Value;

use crate::error::{OpsError, OpsResult};

/// Double-quote a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Anything else is rejected rather than escaped: table and column names come
/// from configuration and a stray quote there is a mistake, not data.
pub fn quote_ident(name: &str) -> OpsResult<String> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(OpsError::Validation(format!("invalid SQL identifier {name:?}")));
    }
    Ok(format!("\"{name}\""))
}

/// `"schema"."table"`.
pub fn qualified(schema: &str, table: &str) -> OpsResult<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// Single-quoted string literal with embedded quotes doubled.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a JSON scalar as a SQL literal.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}

/// Textual form of a key value, used for `col::text = $1` comparisons.
pub fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quotes_plain_identifiers_only() {
        assert_eq!(quote_ident("image_url").unwrap(), "\"image_url\"");
        assert_eq!(qualified("public", "products").unwrap(), "\"public\".\"products\"");
        assert!(quote_ident("").is_err());
        assert!(quote_ident("1abc").is_err());
        assert!(quote_ident("name\"; DROP TABLE x; --").is_err());
    }

    #[test]
    fn literals_escape_quotes() {
        assert_eq!(quote_literal("O'Brien's"), "'O''Brien''s'");
        assert_eq!(sql_literal(&json!(10)), "10");
        assert_eq!(sql_literal(&json!("USD")), "'USD'");
        assert_eq!(sql_literal(&Value::Null), "NULL");
    }

    #[test]
    fn key_text_accepts_scalars() {
        assert_eq!(key_text(&json!(42)).as_deref(), Some("42"));
        assert_eq!(key_text(&json!("abc")).as_deref(), Some("abc"));
        assert_eq!(key_text(&Value::Null), None);
    }
}
