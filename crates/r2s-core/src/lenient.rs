//! Lenient scalar coercion for documents that round-trip through clients and
//! external collaborators.
//!
//! Context documents are produced by spreadsheets, browsers and third-party
//! services, so numbers arrive as strings and flags arrive as `0`/`1`. The
//! helpers here coerce what they can and report `None` for the rest; callers
//! decide whether a miss is an error.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a JSON value to an integer.
///
/// Accepts integers, integral floats and numeric strings (surrounding
/// whitespace ignored). Everything else is `None`.
pub fn int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

/// Coerce a JSON value to a float. Numeric strings are accepted.
pub fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Render a JSON scalar as text. `null` renders empty.
pub fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Truthiness of a JSON value: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

// ── serde adapters ──

pub fn opt_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(float(&Value::deserialize(deserializer)?))
}

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(truthy(&Value::deserialize(deserializer)?))
}

/// Treat an explicit `null` the same as a missing field.
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_accepts_numbers_and_numeric_strings() {
        assert_eq!(int(&json!(7)), Some(7));
        assert_eq!(int(&json!(7.0)), Some(7));
        assert_eq!(int(&json!(" 12 ")), Some(12));
        assert_eq!(int(&json!("3.0")), Some(3));
    }

    #[test]
    fn int_rejects_everything_else() {
        assert_eq!(int(&json!(7.5)), None);
        assert_eq!(int(&json!("seven")), None);
        assert_eq!(int(&json!(null)), None);
        assert_eq!(int(&json!(true)), None);
        assert_eq!(int(&json!([1])), None);
    }

    #[test]
    fn float_parses_strings() {
        assert_eq!(float(&json!("2.5")), Some(2.5));
        assert_eq!(float(&json!(3)), Some(3.0));
        assert_eq!(float(&json!("NaN")), None);
        assert_eq!(float(&json!({})), None);
    }

    #[test]
    fn text_renders_scalars() {
        assert_eq!(text(&json!(null)), "");
        assert_eq!(text(&json!("GM")), "GM");
        assert_eq!(text(&json!(2)), "2");
        assert_eq!(text(&json!(1.5)), "1.5");
        assert_eq!(text(&json!(false)), "false");
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(!truthy(&json!({})));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!([0])));
    }

    #[test]
    fn or_default_maps_null() {
        #[derive(serde::Deserialize)]
        struct Doc {
            #[serde(default, deserialize_with = "or_default")]
            items: Vec<i64>,
        }
        let doc: Doc = serde_json::from_value(json!({"items": null})).unwrap();
        assert!(doc.items.is_empty());
        let doc: Doc = serde_json::from_value(json!({})).unwrap();
        assert!(doc.items.is_empty());
        let doc: Doc = serde_json::from_value(json!({"items": [1, 2]})).unwrap();
        assert_eq!(doc.items, vec![1, 2]);
    }
}
