//! Value codecs.
//!
//! A codec converts typed values to the storage representation a backend
//! expects (`encode`) and converts raw driver values back into typed values
//! (`decode`). Every per-type hook has a default; backends override the
//! handful of types they store differently.

pub mod bar;
mod document;
mod sql;
pub mod temporal;

pub use document::DocumentCodec;
pub use sql::{PostgresCodec, SqlTextCodec};

use std::fmt;

use base64::Engine as _;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::{DalError, DalResult};
use crate::types::FieldType;
use crate::value::{exact_integer, quantize, Value};

/// A value as a driver hands it over or expects it
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

/// A row as returned by a driver, in column order
pub type RawRow = Vec<RawValue>;

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            RawValue::Null => JsonValue::Null,
            RawValue::Bool(b) => JsonValue::Bool(*b),
            RawValue::Int(i) => JsonValue::from(*i),
            RawValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            RawValue::Decimal(d) => JsonValue::String(d.to_string()),
            RawValue::Text(s) => JsonValue::String(s.clone()),
            RawValue::Bytes(b) => {
                JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            RawValue::Json(j) => j.clone(),
        }
    }
}

impl From<JsonValue> for RawValue {
    fn from(j: JsonValue) -> Self {
        match j {
            JsonValue::Null => RawValue::Null,
            JsonValue::Bool(b) => RawValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                None => RawValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            JsonValue::String(s) => RawValue::Text(s),
            other => RawValue::Json(other),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<f64> for RawValue {
    fn from(f: f64) -> Self {
        RawValue::Float(f)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "NULL"),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Float(x) => write!(f, "{}", x),
            RawValue::Decimal(d) => write!(f, "{}", d),
            RawValue::Text(s) => write!(f, "'{}'", s),
            RawValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            RawValue::Json(j) => write!(f, "{}", j),
        }
    }
}

type Decoded = Result<Value, String>;

fn unexpected(raw: &RawValue) -> String {
    format!("unexpected raw value {}", raw)
}

/// Per-backend value codec
pub trait Codec: Send + Sync {
    /// Backend the codec belongs to
    fn name(&self) -> &str;

    /// Coerce `value` to `ty` and encode it for storage.
    fn encode(&self, value: &Value, ty: &FieldType) -> DalResult<RawValue> {
        let value = value.coerce(ty, None)?;
        self.encode_coerced(&value, ty)
    }

    /// Encode a value already coerced to `ty`.
    fn encode_coerced(&self, value: &Value, ty: &FieldType) -> DalResult<RawValue> {
        let raw = match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => self.encode_bool(*b),
            Value::Int(i) => RawValue::Int(*i),
            Value::Float(f) => RawValue::Float(*f),
            Value::Decimal(d) => self.encode_decimal(d),
            Value::Str(s) => RawValue::Text(s.clone()),
            Value::Date(d) => self.encode_date(d),
            Value::Time(t) => RawValue::Text(temporal::format_time(t)),
            Value::DateTime(dt) => self.encode_datetime(dt),
            Value::Blob(b) => self.encode_blob(b),
            Value::Json(j) => self.encode_json(j),
            Value::Key(k) => self.encode_key(k),
            Value::Reference { id, .. } => self.encode_coerced(id, &FieldType::Id)?,
            Value::List(items) => {
                let element = ty.element_type().unwrap_or_else(FieldType::string);
                self.encode_list(items, &element)?
            }
        };
        Ok(raw)
    }

    fn encode_bool(&self, b: bool) -> RawValue {
        RawValue::Text(if b { "T" } else { "F" }.to_string())
    }

    fn encode_decimal(&self, d: &Decimal) -> RawValue {
        RawValue::Decimal(*d)
    }

    fn encode_date(&self, d: &chrono::NaiveDate) -> RawValue {
        RawValue::Text(d.format("%Y-%m-%d").to_string())
    }

    fn encode_datetime(&self, dt: &chrono::NaiveDateTime) -> RawValue {
        RawValue::Text(temporal::format_datetime(dt, ' '))
    }

    fn encode_blob(&self, b: &[u8]) -> RawValue {
        RawValue::Text(base64::engine::general_purpose::STANDARD.encode(b))
    }

    fn encode_json(&self, j: &JsonValue) -> RawValue {
        RawValue::Text(j.to_string())
    }

    fn encode_key(&self, key: &str) -> RawValue {
        RawValue::Text(key.to_string())
    }

    fn encode_list(&self, items: &[Value], element: &FieldType) -> DalResult<RawValue> {
        let texts: Vec<String> = items
            .iter()
            .map(|item| match item {
                Value::Reference { id, .. } => id.to_string(),
                Value::Str(s) | Value::Key(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        Ok(RawValue::Text(bar::bar_encode(&texts, element)?))
    }

    /// Decode a raw driver value into a value of type `ty`.
    fn decode(&self, raw: RawValue, ty: &FieldType) -> DalResult<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let shown = raw.to_string();
        let decoded = match ty {
            FieldType::Boolean => self.decode_boolean(raw),
            FieldType::Integer | FieldType::BigInt => self.decode_integer(raw),
            FieldType::Double => self.decode_double(raw),
            FieldType::Decimal { scale, .. } => self.decode_decimal(raw, *scale),
            FieldType::String(_) | FieldType::Text | FieldType::Upload => self.decode_text(raw),
            FieldType::Date => self.decode_date(raw),
            FieldType::Time => self.decode_time(raw),
            FieldType::DateTime => self.decode_datetime(raw),
            FieldType::Blob => self.decode_blob(raw),
            FieldType::Json => self.decode_json(raw),
            FieldType::Id => self.decode_id(raw),
            FieldType::Reference(table) => self
                .decode_id(raw)
                .map(|id| Value::reference(table.clone(), id)),
            FieldType::ListString | FieldType::ListInteger | FieldType::ListReference(_) => {
                let element = ty.element_type().unwrap_or_else(FieldType::string);
                self.decode_list(raw, &element)
            }
        };
        decoded.map_err(|reason| DalError::Decode {
            column: String::new(),
            field_type: ty.to_string(),
            raw: shown,
            reason,
        })
    }

    fn decode_boolean(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Bool(b) => Ok(Value::Bool(b)),
            RawValue::Int(i) => Ok(Value::Bool(i != 0)),
            RawValue::Text(ref s) => match s.trim() {
                "T" | "t" | "true" | "True" | "TRUE" | "1" => Ok(Value::Bool(true)),
                "F" | "f" | "false" | "False" | "FALSE" | "0" => Ok(Value::Bool(false)),
                _ => Err(unexpected(&raw)),
            },
            other => Err(unexpected(&other)),
        }
    }

    fn decode_integer(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Float(f) => exact_integer(f)
                .map(Value::Int)
                .ok_or_else(|| format!("{} is not an integer in range", f)),
            RawValue::Decimal(d) if d.fract().is_zero() => {
                d.to_i64().map(Value::Int).ok_or_else(|| "integer overflow".to_string())
            }
            RawValue::Text(ref s) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|e| format!("{}", e)),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_double(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Float(f) => Ok(Value::Float(f)),
            RawValue::Int(i) => Ok(Value::Float(i as f64)),
            RawValue::Decimal(d) => d
                .to_f64()
                .map(Value::Float)
                .ok_or_else(|| "decimal out of range".to_string()),
            RawValue::Text(ref s) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|e| format!("{}", e)),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_decimal(&self, raw: RawValue, scale: u8) -> Decoded {
        let d = match raw {
            RawValue::Decimal(d) => d,
            RawValue::Int(i) => Decimal::from(i),
            RawValue::Float(f) => {
                Decimal::from_f64(f).ok_or_else(|| format!("{} is not a finite decimal", f))?
            }
            RawValue::Text(ref s) => s.trim().parse::<Decimal>().map_err(|e| e.to_string())?,
            other => return Err(unexpected(&other)),
        };
        Ok(Value::Decimal(quantize(d, scale)))
    }

    fn decode_text(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Text(s) => Ok(Value::Str(s)),
            RawValue::Bytes(b) => String::from_utf8(b)
                .map(Value::Str)
                .map_err(|e| e.to_string()),
            RawValue::Int(i) => Ok(Value::Str(i.to_string())),
            RawValue::Float(f) => Ok(Value::Str(f.to_string())),
            RawValue::Decimal(d) => Ok(Value::Str(d.to_string())),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_date(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Text(s) => temporal::parse_date(&s).map(Value::Date),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_time(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Text(s) => temporal::parse_time(&s).map(Value::Time),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_datetime(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Text(s) => temporal::parse_datetime(&s).map(Value::DateTime),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_blob(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Bytes(b) => Ok(Value::Blob(b)),
            RawValue::Text(s) => base64::engine::general_purpose::STANDARD
                .decode(s.trim())
                .map(Value::Blob)
                .map_err(|e| format!("invalid base64: {}", e)),
            other => Err(unexpected(&other)),
        }
    }

    fn decode_json(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Json(j) => Ok(Value::Json(j)),
            RawValue::Text(s) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|e| format!("invalid json: {}", e)),
            RawValue::Bytes(b) => serde_json::from_slice(&b)
                .map(Value::Json)
                .map_err(|e| format!("invalid json: {}", e)),
            other => Ok(Value::Json(other.to_json())),
        }
    }

    fn decode_id(&self, raw: RawValue) -> Decoded {
        match raw {
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Text(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => Ok(Value::Key(s)),
            },
            other => self.decode_integer(other),
        }
    }

    fn decode_list(&self, raw: RawValue, element: &FieldType) -> Decoded {
        let items: Vec<RawValue> = match raw {
            RawValue::Text(s) => bar::bar_decode(&s).into_iter().map(RawValue::Text).collect(),
            RawValue::Json(JsonValue::Array(items)) => items.into_iter().map(RawValue::from).collect(),
            other => return Err(unexpected(&other)),
        };
        items
            .into_iter()
            .map(|item| self.decode(item, element).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_from_json() {
        assert_eq!(RawValue::from(serde_json::json!(3)), RawValue::Int(3));
        assert_eq!(RawValue::from(serde_json::json!(2.5)), RawValue::Float(2.5));
        assert_eq!(RawValue::from(serde_json::json!("x")), RawValue::Text("x".into()));
        assert_eq!(
            RawValue::from(serde_json::json!([1])),
            RawValue::Json(serde_json::json!([1]))
        );
    }

    #[test]
    fn test_integer_decode_rejects_lossy_floats() {
        let codec = SqlTextCodec::default();
        assert_eq!(
            codec.decode(RawValue::Float(12.0), &FieldType::Integer).unwrap(),
            Value::Int(12)
        );
        for f in [1e19, f64::NEG_INFINITY, 0.5] {
            let err = codec.decode(RawValue::Float(f), &FieldType::Integer).unwrap_err();
            assert!(matches!(err, DalError::Decode { .. }), "{}", f);
        }
    }

    #[test]
    fn test_default_decoders() {
        let codec = SqlTextCodec::default();
        assert_eq!(
            codec.decode(RawValue::Text("T".into()), &FieldType::Boolean).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            codec.decode(RawValue::Int(0), &FieldType::Boolean).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            codec
                .decode(RawValue::Int(7), &FieldType::Reference("person".into()))
                .unwrap(),
            Value::reference("person", 7)
        );
        assert_eq!(
            codec.decode(RawValue::Null, &FieldType::Date).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decode_failure_names_type_and_raw() {
        let codec = SqlTextCodec::default();
        let err = codec
            .decode(RawValue::Text("maybe".into()), &FieldType::Boolean)
            .unwrap_err()
            .in_column("task.done");
        match err {
            DalError::Decode {
                column,
                field_type,
                raw,
                ..
            } => {
                assert_eq!(column, "task.done");
                assert_eq!(field_type, "boolean");
                assert_eq!(raw, "'maybe'");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
