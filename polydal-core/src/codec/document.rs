//! Extended-JSON codec for the document dialect.

use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};

use super::{temporal, Codec, RawValue};
use crate::error::DalResult;
use crate::types::FieldType;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct DocumentCodec;

/// `ObjectId` keys are 24 hex digits
pub fn is_object_id(key: &str) -> bool {
    key.len() == 24 && key.chars().all(|c| c.is_ascii_hexdigit())
}

fn unwrap_tag<'a>(raw: &'a RawValue, tag: &str) -> Option<&'a JsonValue> {
    match raw {
        RawValue::Json(JsonValue::Object(map)) if map.len() == 1 => map.get(tag),
        _ => None,
    }
}

fn datetime_from_tag(tag: &JsonValue) -> Result<NaiveDateTime, String> {
    match tag {
        JsonValue::String(s) => temporal::parse_datetime(s),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| format!("invalid $date {}", n)),
        JsonValue::Object(o) => match o.get("$numberLong").and_then(JsonValue::as_str) {
            Some(ms) => ms
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| format!("invalid $date {}", ms)),
            None => Err(format!("invalid $date {}", tag)),
        },
        other => Err(format!("invalid $date {}", other)),
    }
}

impl Codec for DocumentCodec {
    fn name(&self) -> &str {
        "mongodb"
    }

    fn encode_bool(&self, b: bool) -> RawValue {
        RawValue::Bool(b)
    }

    fn encode_decimal(&self, d: &Decimal) -> RawValue {
        RawValue::Json(json!({ "$numberDecimal": d.to_string() }))
    }

    fn encode_date(&self, d: &chrono::NaiveDate) -> RawValue {
        RawValue::Json(json!({ "$date": format!("{}T00:00:00Z", d.format("%Y-%m-%d")) }))
    }

    fn encode_datetime(&self, dt: &NaiveDateTime) -> RawValue {
        RawValue::Json(json!({ "$date": format!("{}Z", temporal::format_datetime(dt, 'T')) }))
    }

    fn encode_blob(&self, b: &[u8]) -> RawValue {
        RawValue::Json(json!({
            "$binary": {
                "base64": base64::engine::general_purpose::STANDARD.encode(b),
                "subType": "00"
            }
        }))
    }

    fn encode_json(&self, j: &JsonValue) -> RawValue {
        RawValue::Json(j.clone())
    }

    fn encode_key(&self, key: &str) -> RawValue {
        if is_object_id(key) {
            RawValue::Json(json!({ "$oid": key }))
        } else {
            RawValue::Text(key.to_string())
        }
    }

    fn encode_list(&self, items: &[Value], element: &FieldType) -> DalResult<RawValue> {
        let encoded = items
            .iter()
            .map(|item| self.encode_coerced(item, element).map(|raw| raw.to_json()))
            .collect::<DalResult<Vec<_>>>()?;
        Ok(RawValue::Json(JsonValue::Array(encoded)))
    }

    fn decode_decimal(&self, raw: RawValue, scale: u8) -> Result<Value, String> {
        match unwrap_tag(&raw, "$numberDecimal").and_then(JsonValue::as_str) {
            Some(s) => {
                let d = s.parse::<Decimal>().map_err(|e| e.to_string())?;
                Ok(Value::Decimal(crate::value::quantize(d, scale)))
            }
            None => match raw {
                RawValue::Json(other) => Err(format!("unexpected decimal {}", other)),
                plain => SqlDefaults.decode_decimal(plain, scale),
            },
        }
    }

    fn decode_date(&self, raw: RawValue) -> Result<Value, String> {
        match unwrap_tag(&raw, "$date") {
            Some(tag) => datetime_from_tag(tag).map(|dt| Value::Date(dt.date())),
            None => SqlDefaults.decode_date(raw),
        }
    }

    fn decode_datetime(&self, raw: RawValue) -> Result<Value, String> {
        match unwrap_tag(&raw, "$date") {
            Some(tag) => datetime_from_tag(tag).map(Value::DateTime),
            None => SqlDefaults.decode_datetime(raw),
        }
    }

    fn decode_blob(&self, raw: RawValue) -> Result<Value, String> {
        let encoded = match unwrap_tag(&raw, "$binary") {
            Some(JsonValue::Object(inner)) => inner.get("base64").and_then(JsonValue::as_str),
            Some(JsonValue::String(s)) => Some(s.as_str()),
            _ => None,
        };
        match encoded {
            Some(b64) => base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map(Value::Blob)
                .map_err(|e| format!("invalid $binary: {}", e)),
            None => SqlDefaults.decode_blob(raw),
        }
    }

    fn decode_id(&self, raw: RawValue) -> Result<Value, String> {
        if let Some(oid) = unwrap_tag(&raw, "$oid").and_then(JsonValue::as_str) {
            return Ok(Value::Key(oid.to_string()));
        }
        match raw {
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Text(s) => Ok(Value::Key(s)),
            other => Err(format!("unexpected raw value {}", other)),
        }
    }
}

/// Default hooks, for raw values that carry no extended-JSON tag
struct SqlDefaults;

impl Codec for SqlDefaults {
    fn name(&self) -> &str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn roundtrip(value: Value, ty: FieldType) {
        let codec = DocumentCodec;
        let raw = codec.encode(&value, &ty).unwrap();
        assert_eq!(codec.decode(raw, &ty).unwrap(), value, "{}", ty);
    }

    #[test]
    fn test_extended_json_forms() {
        let codec = DocumentCodec;
        let day = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(
            codec.encode(&Value::Date(day), &FieldType::Date).unwrap(),
            RawValue::Json(json!({"$date": "2024-05-06T00:00:00Z"}))
        );
        assert_eq!(
            codec
                .encode(&Value::Key("65a1b2c3d4e5f60718293a4b".into()), &FieldType::Id)
                .unwrap(),
            RawValue::Json(json!({"$oid": "65a1b2c3d4e5f60718293a4b"}))
        );
        assert_eq!(
            codec
                .encode(&Value::from(vec![1, 2]), &FieldType::ListInteger)
                .unwrap(),
            RawValue::Json(json!([1, 2]))
        );
    }

    #[test]
    fn test_roundtrips() {
        let stamp = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_micro_opt(1, 2, 3, 456_789)
            .unwrap();
        roundtrip(Value::DateTime(stamp), FieldType::DateTime);
        roundtrip(Value::Date(stamp.date()), FieldType::Date);
        roundtrip(
            Value::Decimal("99.125".parse().unwrap()),
            FieldType::Decimal {
                precision: 12,
                scale: 3,
            },
        );
        roundtrip(Value::blob(vec![0u8, 0, 9]), FieldType::Blob);
        roundtrip(Value::Json(json!({"n": [1, [2, 3]], "m": {}})), FieldType::Json);
        roundtrip(Value::from(vec!["a", "b"]), FieldType::ListString);
        roundtrip(Value::Bool(true), FieldType::Boolean);
    }

    #[test]
    fn test_decodes_millis_dates() {
        let codec = DocumentCodec;
        let v = codec
            .decode(
                RawValue::Json(json!({"$date": {"$numberLong": "0"}})),
                &FieldType::DateTime,
            )
            .unwrap();
        assert_eq!(
            v,
            Value::DateTime(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_ids_stay_keys() {
        let codec = DocumentCodec;
        assert_eq!(
            codec
                .decode(RawValue::Json(json!({"$oid": "abc"})), &FieldType::Id)
                .unwrap(),
            Value::Key("abc".into())
        );
        assert_eq!(
            codec
                .decode(RawValue::Text("00042".into()), &FieldType::Reference("p".into()))
                .unwrap(),
            Value::reference("p", Value::Key("00042".into()))
        );
    }
}
