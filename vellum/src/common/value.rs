use crate::common::{Document, DATE_KEY};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// A dynamically-typed [Document] value.
///
/// Scalars, nested documents and arrays cover everything a JSON payload can
/// express; dates are kept as a distinct variant so that TTL expiry and
/// timestamp refreshes can reason about them.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Double` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::DateTime(_) => "date",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    /// Equality as the store sees it: numbers compare by value across
    /// `Int` and `Double`, everything else structurally.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loosely_equals(y))
            }
            (Value::Document(a), Value::Document(b)) => a.loosely_equals(b),
            (a, b) => a == b,
        }
    }

    /// Ordering between values of the same class (numbers, strings, dates,
    /// booleans). Values of different classes are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => {
                a.as_f64().and_then(|x| b.as_f64().and_then(|y| x.partial_cmp(&y)))
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Renders strings without quotes and everything else as JSON.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Converts a parsed JSON tree into a value.
    ///
    /// `{"$date": ...}` objects decode to [Value::DateTime]; an invalid date
    /// payload is rejected as bad input.
    pub fn from_json_value(json: serde_json::Value) -> StoreResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => Ok(Value::Double(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => {
                let values = items
                    .into_iter()
                    .map(Value::from_json_value)
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(date) = map.get(DATE_KEY) {
                        return parse_date(date).map(Value::DateTime);
                    }
                }
                Ok(Value::Document(Document::from_json_map(map)?))
            }
        }
    }

    /// Converts this value into a JSON tree.
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => {
                let mut map = serde_json::Map::new();
                map.insert(DATE_KEY.to_string(), serde_json::Value::String(format_date(dt)));
                serde_json::Value::Object(map)
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json_value).collect())
            }
            Value::Document(doc) => doc.to_json_value(),
        }
    }
}

fn parse_date(date: &serde_json::Value) -> StoreResult<DateTime<Utc>> {
    let parsed = match date {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    parsed.ok_or_else(|| {
        log::error!("Invalid date payload {}", date);
        StoreError::new(&format!("Invalid date payload {}", date), ErrorKind::BadInputError)
    })
}

pub(crate) fn format_date(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(DATE_KEY, &format_date(dt))?;
                map.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Document(doc) => doc.serialize(serializer),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use chrono::TimeZone;

    #[test]
    fn numbers_compare_across_int_and_double() {
        assert!(Value::Int(3).loosely_equals(&Value::Double(3.0)));
        assert_eq!(Value::Int(2).compare(&Value::Double(2.5)), Some(Ordering::Less));
        assert_ne!(Value::Int(3), Value::Double(3.0));
    }

    #[test]
    fn different_classes_are_not_comparable() {
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn date_round_trips_through_extended_json() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let json = Value::DateTime(dt).to_string();
        assert_eq!(json, r#"{"$date":"2024-05-01T12:30:00.000Z"}"#);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(Value::from_json_value(parsed).unwrap(), Value::DateTime(dt));
    }

    #[test]
    fn date_accepts_epoch_millis() {
        let parsed = Value::from_json_value(serde_json::json!({"$date": 0})).unwrap();
        assert_eq!(parsed, Value::DateTime(DateTime::from_timestamp_millis(0).unwrap()));
    }

    #[test]
    fn invalid_date_is_bad_input() {
        let err = Value::from_json_value(serde_json::json!({"$date": "yesterday"})).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BadInputError);
    }

    #[test]
    fn large_unsigned_becomes_double() {
        let parsed = Value::from_json_value(serde_json::json!(u64::MAX)).unwrap();
        assert!(matches!(parsed, Value::Double(_)));
    }

    #[test]
    fn plain_string_drops_quotes_only_for_strings() {
        assert_eq!(Value::from("e1").to_plain_string(), "e1");
        assert_eq!(Value::Int(7).to_plain_string(), "7");
        assert_eq!(Value::from(doc! { a: 1 }).to_plain_string(), r#"{"a":1}"#);
    }

    #[test]
    fn option_and_vec_conversions() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
    }
}
