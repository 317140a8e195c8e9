//! Codecs for relational backends.

use base64::Engine as _;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use super::{Codec, RawValue};
use crate::value::Value;

/// Text-oriented codec shared by ref-sql, sqlite and mysql.
///
/// Booleans are stored as `'T'`/`'F'`, blobs as base64 text, json as its
/// serialized text and lists bar-encoded.
#[derive(Debug, Clone)]
pub struct SqlTextCodec {
    backend: String,
}

impl SqlTextCodec {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
        }
    }
}

impl Default for SqlTextCodec {
    fn default() -> Self {
        Self::new("ref-sql")
    }
}

impl Codec for SqlTextCodec {
    fn name(&self) -> &str {
        &self.backend
    }

    fn encode_decimal(&self, d: &Decimal) -> RawValue {
        // text keeps the declared scale on backends that store decimals loosely
        RawValue::Text(d.to_string())
    }
}

/// Codec for postgres: native booleans, `bytea` blobs, native json.
#[derive(Debug, Clone, Default)]
pub struct PostgresCodec;

impl Codec for PostgresCodec {
    fn name(&self) -> &str {
        "postgres"
    }

    fn encode_bool(&self, b: bool) -> RawValue {
        RawValue::Bool(b)
    }

    fn encode_blob(&self, b: &[u8]) -> RawValue {
        RawValue::Bytes(b.to_vec())
    }

    fn encode_json(&self, j: &JsonValue) -> RawValue {
        RawValue::Json(j.clone())
    }

    fn decode_blob(&self, raw: RawValue) -> Result<Value, String> {
        match raw {
            RawValue::Bytes(b) => Ok(Value::Blob(b)),
            // bytea text output: `\x0001ff`
            RawValue::Text(s) => match s.strip_prefix("\\x") {
                Some(digits) => hex::decode(digits)
                    .map(Value::Blob)
                    .map_err(|e| format!("invalid bytea: {}", e)),
                None => base64::engine::general_purpose::STANDARD
                    .decode(s.trim())
                    .map(Value::Blob)
                    .map_err(|e| format!("invalid base64: {}", e)),
            },
            other => Err(format!("unexpected raw value {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;
    use chrono::NaiveDate;
    use serde_json::json;

    fn roundtrip(codec: &dyn Codec, value: Value, ty: FieldType) {
        let raw = codec.encode(&value, &ty).unwrap();
        assert_eq!(codec.decode(raw, &ty).unwrap(), value, "{} via {}", ty, codec.name());
    }

    #[test]
    fn test_text_codec_storage_forms() {
        let codec = SqlTextCodec::default();
        assert_eq!(
            codec.encode(&Value::Bool(true), &FieldType::Boolean).unwrap(),
            RawValue::Text("T".into())
        );
        assert_eq!(
            codec
                .encode(&Value::from(vec!["a", "b|c"]), &FieldType::ListString)
                .unwrap(),
            RawValue::Text("|a|b||c|".into())
        );
        assert_eq!(
            codec
                .encode(&Value::from(vec![3, 4]), &FieldType::ListReference("tag".into()))
                .unwrap(),
            RawValue::Text("|3|4|".into())
        );
        assert!(codec
            .encode(&Value::from(vec!["a", "|b"]), &FieldType::ListString)
            .is_err());
        assert_eq!(
            codec.encode(&Value::blob(vec![0u8, 1, 2]), &FieldType::Blob).unwrap(),
            RawValue::Text("AAEC".into())
        );
    }

    #[test]
    fn test_text_codec_roundtrips() {
        let codec = SqlTextCodec::new("sqlite");
        let stamp = NaiveDate::from_ymd_opt(2023, 11, 5)
            .unwrap()
            .and_hms_micro_opt(23, 59, 58, 123_456)
            .unwrap();
        roundtrip(&codec, Value::DateTime(stamp), FieldType::DateTime);
        roundtrip(
            &codec,
            Value::Decimal("12.30".parse().unwrap()),
            FieldType::Decimal {
                precision: 10,
                scale: 2,
            },
        );
        roundtrip(
            &codec,
            Value::Json(json!({"a": [1, 2, {"b": null}], "c": "x"})),
            FieldType::Json,
        );
        roundtrip(&codec, Value::blob(vec![0u8, 0, 255, 0]), FieldType::Blob);
        roundtrip(&codec, Value::from(vec![1, 22, 333]), FieldType::ListInteger);
        roundtrip(&codec, Value::from(vec!["x|y", "z"]), FieldType::ListString);
        roundtrip(&codec, Value::Bool(false), FieldType::Boolean);
    }

    #[test]
    fn test_decimal_quantized_on_decode() {
        let codec = SqlTextCodec::default();
        let ty = FieldType::Decimal {
            precision: 10,
            scale: 2,
        };
        let v = codec.decode(RawValue::Float(1.005), &ty).unwrap();
        assert_eq!(v.to_string().split('.').nth(1).map(str::len), Some(2));
        let v = codec.decode(RawValue::Text("7".into()), &ty).unwrap();
        assert_eq!(v.to_string(), "7.00");
    }

    #[test]
    fn test_postgres_native_forms() {
        let codec = PostgresCodec;
        assert_eq!(
            codec.encode(&Value::Bool(false), &FieldType::Boolean).unwrap(),
            RawValue::Bool(false)
        );
        assert_eq!(
            codec.encode(&Value::blob(vec![1u8, 0]), &FieldType::Blob).unwrap(),
            RawValue::Bytes(vec![1, 0])
        );
        assert_eq!(
            codec.decode(RawValue::Text("\\x00ff".into()), &FieldType::Blob).unwrap(),
            Value::blob(vec![0u8, 255])
        );
        roundtrip(&codec, Value::Json(json!([[1], {"k": [true]}])), FieldType::Json);
        roundtrip(&codec, Value::blob(vec![0u8, 7, 0]), FieldType::Blob);
    }
}
