//! Leaf value coercion shared by the body and query validators.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::descriptor::LeafKind;

/// Check an already-typed JSON value, normalizing dates and identifiers.
pub fn typed(kind: &LeafKind, value: &Value) -> Result<Value, String> {
    let ok = match (kind, value) {
        (LeafKind::Any, _)
        | (LeafKind::String, Value::String(_))
        | (LeafKind::Number, Value::Number(_))
        | (LeafKind::Boolean, Value::Bool(_)) => Some(value.clone()),
        (LeafKind::Date, Value::String(s)) => date(s).map(Value::String),
        (LeafKind::Identifier, Value::String(s)) => identifier(s).map(Value::String),
        (LeafKind::Enum(values), Value::String(s)) => {
            values.contains(s).then(|| Value::String(s.clone()))
        }
        _ => None,
    };
    ok.ok_or_else(|| expected(kind))
}

/// Coerce query-string text to the leaf's JSON type.
pub fn from_text(kind: &LeafKind, text: &str) -> Result<Value, String> {
    let ok = match kind {
        LeafKind::String | LeafKind::Any => Some(Value::String(text.to_owned())),
        LeafKind::Number => number(text),
        LeafKind::Boolean => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        LeafKind::Date => date(text).map(Value::String),
        LeafKind::Identifier => identifier(text).map(Value::String),
        LeafKind::Enum(values) => values
            .iter()
            .any(|v| v == text)
            .then(|| Value::String(text.to_owned())),
    };
    ok.ok_or_else(|| expected(kind))
}

/// Server-mode coercion: strings are parsed, typed values are checked.
pub fn lenient(kind: &LeafKind, value: &Value) -> Result<Value, String> {
    match value {
        Value::String(text) => from_text(kind, text),
        other => typed(kind, other),
    }
}

fn expected(kind: &LeafKind) -> String {
    match kind {
        LeafKind::Enum(values) => format!("expected one of: {}", values.join(", ")),
        other => format!("expected {}", other.describe()),
    }
}

fn number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Normalize to UTC RFC 3339 with millisecond precision. Bare dates are
/// read as midnight UTC.
fn date(text: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let midnight = day.and_hms_opt(0, 0, 0)?.and_utc();
    Some(midnight.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn identifier(text: &str) -> Option<String> {
    Uuid::parse_str(text).ok().map(|id| id.hyphenated().to_string())
}
