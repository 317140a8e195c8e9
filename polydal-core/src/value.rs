//! Typed values.
//!
//! `Value` is both the literal operand of expressions and the decoded
//! content of a reconstructed row.

use std::fmt;

use base64::Engine as _;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value as JsonValue;

use crate::codec::temporal;
use crate::error::{DalError, DalResult};
use crate::types::FieldType;

/// A typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Str(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
    Json(JsonValue),
    List(Vec<Value>),
    /// Opaque record key (document stores)
    Key(String),
    /// Id of a record in another table
    Reference { table: String, id: Box<Value> },
}

impl Value {
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Blob(bytes.into())
    }

    pub fn reference(table: impl Into<String>, id: impl Into<Value>) -> Self {
        Value::Reference {
            table: table.into(),
            id: Box::new(id.into()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
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
            Value::Reference { id, .. } => id.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Key(s) => Some(s),
            _ => None,
        }
    }

    /// Type a bare literal has when nothing else constrains it
    pub fn natural_type(&self) -> FieldType {
        match self {
            Value::Null | Value::Str(_) => FieldType::string(),
            Value::Bool(_) => FieldType::Boolean,
            Value::Int(_) => FieldType::BigInt,
            Value::Float(_) => FieldType::Double,
            Value::Decimal(d) => FieldType::Decimal {
                precision: 38,
                scale: d.scale() as u8,
            },
            Value::Date(_) => FieldType::Date,
            Value::Time(_) => FieldType::Time,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Blob(_) => FieldType::Blob,
            Value::Json(_) => FieldType::Json,
            Value::List(items) => match items.first() {
                Some(Value::Int(_)) => FieldType::ListInteger,
                Some(Value::Reference { table, .. }) => FieldType::ListReference(table.clone()),
                _ => FieldType::ListString,
            },
            Value::Key(_) => FieldType::Id,
            Value::Reference { table, .. } => FieldType::Reference(table.clone()),
        }
    }

    /// Convert this value so it can be stored in / compared with a field of
    /// type `ty`. Fails with `TypeCoercion` when no faithful conversion exists.
    pub fn coerce(&self, ty: &FieldType, field: Option<&str>) -> DalResult<Value> {
        let fail = || DalError::TypeCoercion {
            value: self.to_string(),
            field_type: ty.to_string(),
            field: field.map(str::to_string),
        };

        if self.is_null() {
            return Ok(Value::Null);
        }

        match ty {
            FieldType::Boolean => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Str(s) => match s.to_ascii_lowercase().as_str() {
                    "t" | "true" | "1" | "on" => Ok(Value::Bool(true)),
                    "f" | "false" | "0" | "off" => Ok(Value::Bool(false)),
                    _ => Err(fail()),
                },
                _ => Err(fail()),
            },
            FieldType::Integer | FieldType::BigInt => self.to_integer().ok_or_else(fail),
            FieldType::Id => match self {
                Value::Key(k) => Ok(Value::Key(k.clone())),
                Value::Reference { id, .. } => id.coerce(ty, field),
                _ => self.to_integer().ok_or_else(fail),
            },
            FieldType::Double => match self {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Decimal(d) => d.to_f64().map(Value::Float).ok_or_else(fail),
                Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| fail()),
                _ => Err(fail()),
            },
            FieldType::Decimal { scale, .. } => {
                let d = match self {
                    Value::Int(i) => Decimal::from(*i),
                    Value::Float(f) => Decimal::from_f64(*f).ok_or_else(fail)?,
                    Value::Decimal(d) => *d,
                    Value::Str(s) => s.trim().parse::<Decimal>().map_err(|_| fail())?,
                    _ => return Err(fail()),
                };
                Ok(Value::Decimal(quantize(d, *scale)))
            }
            FieldType::String(_) | FieldType::Text | FieldType::Upload => match self {
                Value::Str(s) | Value::Key(s) => Ok(Value::Str(s.clone())),
                Value::Int(i) => Ok(Value::Str(i.to_string())),
                Value::Float(f) => Ok(Value::Str(f.to_string())),
                Value::Decimal(d) => Ok(Value::Str(d.to_string())),
                _ => Err(fail()),
            },
            FieldType::Date => match self {
                Value::Date(d) => Ok(Value::Date(*d)),
                Value::DateTime(dt) => Ok(Value::Date(dt.date())),
                Value::Str(s) => temporal::parse_date(s).map(Value::Date).map_err(|_| fail()),
                _ => Err(fail()),
            },
            FieldType::Time => match self {
                Value::Time(t) => Ok(Value::Time(*t)),
                Value::DateTime(dt) => Ok(Value::Time(dt.time())),
                Value::Str(s) => temporal::parse_time(s).map(Value::Time).map_err(|_| fail()),
                _ => Err(fail()),
            },
            FieldType::DateTime => match self {
                Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
                Value::Date(d) => Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
                Value::Str(s) => temporal::parse_datetime(s)
                    .map(Value::DateTime)
                    .map_err(|_| fail()),
                _ => Err(fail()),
            },
            FieldType::Blob => match self {
                Value::Blob(b) => Ok(Value::Blob(b.clone())),
                Value::Str(s) => Ok(Value::Blob(s.as_bytes().to_vec())),
                _ => Err(fail()),
            },
            FieldType::Json => Ok(Value::Json(self.to_json())),
            FieldType::Reference(table) => match self {
                Value::Reference { id, .. } => Ok(Value::Reference {
                    table: table.clone(),
                    id: id.clone(),
                }),
                Value::Key(k) => Ok(Value::reference(table.clone(), Value::Key(k.clone()))),
                _ => Ok(Value::reference(table.clone(), self.to_integer().ok_or_else(fail)?)),
            },
            FieldType::ListString | FieldType::ListInteger | FieldType::ListReference(_) => {
                let element = ty.element_type().ok_or_else(fail)?;
                let items = match self {
                    Value::List(items) => items.clone(),
                    other => vec![other.clone()],
                };
                items
                    .iter()
                    .map(|item| item.coerce(&element, field))
                    .collect::<DalResult<Vec<_>>>()
                    .map(Value::List)
            }
        }
    }

    fn to_integer(&self) -> Option<Value> {
        match self {
            Value::Int(i) => Some(Value::Int(*i)),
            Value::Float(f) => exact_integer(*f).map(Value::Int),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64().map(Value::Int),
            Value::Str(s) => s.trim().parse().ok().map(Value::Int),
            Value::Reference { id, .. } => id.to_integer(),
            _ => None,
        }
    }

    /// JSON view used for serialization and json fields
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// `f` as an `i64` when it is whole and inside the `i64` range.
pub fn exact_integer(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, itself out of range
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Round to `scale` places and pin the scale so `3.5` at scale 2 is `3.50`.
pub fn quantize(d: Decimal, scale: u8) -> Decimal {
    let mut q = d.round_dp(scale as u32);
    q.rescale(scale as u32);
    q
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", temporal::format_time(t)),
            Value::DateTime(dt) => write!(f, "{}", temporal::format_datetime(dt, ' ')),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
            Value::Json(j) => write!(f, "{}", j),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Key(k) => write!(f, "{}", k),
            Value::Reference { table, id } => write!(f, "{}#{}", table, id),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Decimal(d) => serializer.collect_str(d),
            Value::Str(s) | Value::Key(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::Time(t) => serializer.serialize_str(&temporal::format_time(t)),
            Value::DateTime(dt) => serializer.serialize_str(&temporal::format_datetime(dt, 'T')),
            Value::Blob(b) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Json(j) => j.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Reference { id, .. } => id.serialize(serializer),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<JsonValue> for Value {
    fn from(j: JsonValue) -> Self {
        Value::Json(j)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
