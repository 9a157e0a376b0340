//! Quoting helpers producing text that parses back to the same value
//!
//! Used wherever a sub-expression or filter has to be handed to another
//! component as text, e.g. aggregate filters built from a group-by value.

use crate::core::{Value, format_double};

/// Quote a column name: `my "col"` becomes `"my ""col"""`
pub fn quoted_column_ref(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, escaping quotes, backslashes, newlines and tabs
pub fn quoted_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Literal text for any value
pub fn quoted_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Double(d) => format_double(*d),
        Value::Array(items) => format!(
            "array( {} )",
            items.iter().map(quoted_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Map(map) => format!(
            "map( {} )",
            map.iter()
                .map(|(k, v)| format!("{}, {}", quoted_string(k), quoted_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => quoted_string(&other.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quoted_string_escapes() {
        assert_eq!(quoted_string("it's"), "'it''s'");
        assert_eq!(quoted_string("a\\b"), "'a\\\\b'");
        assert_eq!(quoted_string("line\nnext\tcol"), "'line\\nnext\\tcol'");
    }

    #[test]
    fn test_quoted_column_ref_doubles_quotes() {
        assert_eq!(quoted_column_ref("name"), "\"name\"");
        assert_eq!(quoted_column_ref("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_quoted_value_forms() {
        assert_eq!(quoted_value(&Value::Null), "NULL");
        assert_eq!(quoted_value(&Value::Bool(false)), "FALSE");
        assert_eq!(quoted_value(&Value::Double(1.5)), "1.5");
        assert_eq!(
            quoted_value(&Value::Array(vec![
                Value::Int(1),
                Value::from("x"),
                Value::Array(vec![Value::Null]),
            ])),
            "array( 1, 'x', array( NULL ) )"
        );
    }
}
