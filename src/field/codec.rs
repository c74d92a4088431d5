//! Encode/decode between typed field values and storage JSON.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use crate::schema::Mapping;

use super::{CodecError, Field, FieldKind, FieldValue};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";
const TIME_PARSE_FORMAT: &str = "%H:%M:%S%.f";

impl Field {
    /// Encode a typed value into its storage JSON form.
    ///
    /// Pure transformation; fails with [`CodecError::SchemaMismatch`] when
    /// the value's variant does not match the declared kind.
    pub fn encode(&self, value: &FieldValue) -> Result<Value, CodecError> {
        match (self.kind(), value) {
            (FieldKind::Text, FieldValue::Text(s)) => Ok(Value::String(s.clone())),
            (FieldKind::Integer | FieldKind::Long, FieldValue::Integer(n)) => {
                Ok(Value::Number(Number::from(*n)))
            }
            (FieldKind::Float, FieldValue::Float(f)) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or(CodecError::SchemaMismatch {
                    expected: "finite float",
                    found: "non-finite float".to_string(),
                }),
            (FieldKind::Decimal, FieldValue::Decimal(d)) => Ok(Value::String(d.to_string())),
            (FieldKind::Boolean, FieldValue::Boolean(b)) => Ok(Value::Bool(*b)),
            (FieldKind::DateTime, FieldValue::DateTime(dt)) => Ok(Value::String(
                dt.to_rfc3339_opts(SecondsFormat::Micros, true),
            )),
            (FieldKind::Date, FieldValue::Date(d)) => {
                Ok(Value::String(d.format(DATE_FORMAT).to_string()))
            }
            (FieldKind::Time, FieldValue::Time(t)) => {
                Ok(Value::String(t.format(TIME_FORMAT).to_string()))
            }
            (FieldKind::List(element), FieldValue::List(items)) => {
                let mut encoded = Vec::with_capacity(items.len());
                for item in items {
                    encoded.push(element.encode(item)?);
                }
                Ok(Value::Array(encoded))
            }
            (FieldKind::Dict(None), FieldValue::Json(raw)) => match raw {
                Value::Object(_) => Ok(raw.clone()),
                other => Err(CodecError::SchemaMismatch {
                    expected: "object",
                    found: json_shape(other),
                }),
            },
            (FieldKind::Dict(Some(_)), FieldValue::Dict(mapping)) => Ok(mapping.unwrap()),
            (kind, value) => Err(CodecError::SchemaMismatch {
                expected: kind_name(kind),
                found: value_shape(value),
            }),
        }
    }

    /// Decode a storage JSON primitive into a typed value.
    ///
    /// Decoding is strict: temporal text must parse exactly, decimals must be
    /// valid decimal text, and composite shapes must match. Nothing is
    /// silently coerced.
    pub fn decode(&self, raw: &Value) -> Result<FieldValue, CodecError> {
        match self.kind() {
            FieldKind::Text => match raw {
                Value::String(s) => Ok(FieldValue::Text(s.clone())),
                other => Err(mismatch("text", other)),
            },
            FieldKind::Integer | FieldKind::Long => match raw {
                Value::Number(n) => n
                    .as_i64()
                    .map(FieldValue::Integer)
                    .ok_or_else(|| mismatch(kind_name(self.kind()), raw)),
                other => Err(mismatch(kind_name(self.kind()), other)),
            },
            FieldKind::Float => match raw {
                Value::Number(n) => n
                    .as_f64()
                    .map(FieldValue::Float)
                    .ok_or_else(|| mismatch("float", raw)),
                other => Err(mismatch("float", other)),
            },
            FieldKind::Decimal => match raw {
                Value::String(s) => Decimal::from_str(s)
                    .map(FieldValue::Decimal)
                    .map_err(|_| mismatch("decimal text", raw)),
                other => Err(mismatch("decimal text", other)),
            },
            FieldKind::Boolean => match raw {
                Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
                other => Err(mismatch("boolean", other)),
            },
            FieldKind::DateTime => match raw {
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|_| mismatch("ISO-8601 datetime", raw)),
                other => Err(mismatch("ISO-8601 datetime", other)),
            },
            FieldKind::Date => match raw {
                Value::String(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map(FieldValue::Date)
                    .map_err(|_| mismatch("ISO-8601 date", raw)),
                other => Err(mismatch("ISO-8601 date", other)),
            },
            FieldKind::Time => match raw {
                Value::String(s) => NaiveTime::parse_from_str(s, TIME_PARSE_FORMAT)
                    .map(FieldValue::Time)
                    .map_err(|_| mismatch("ISO-8601 time", raw)),
                other => Err(mismatch("ISO-8601 time", other)),
            },
            FieldKind::List(element) => match raw {
                Value::Array(items) => {
                    let mut decoded = Vec::with_capacity(items.len());
                    for item in items {
                        decoded.push(element.decode(item)?);
                    }
                    Ok(FieldValue::List(decoded))
                }
                other => Err(mismatch("list", other)),
            },
            FieldKind::Dict(None) => match raw {
                Value::Object(_) => Ok(FieldValue::Json(raw.clone())),
                other => Err(mismatch("object", other)),
            },
            FieldKind::Dict(Some(schema)) => {
                Mapping::wrap(schema, raw.clone()).map(FieldValue::Dict)
            }
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> CodecError {
    CodecError::SchemaMismatch {
        expected,
        found: json_shape(found),
    }
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "text",
        FieldKind::Integer => "integer",
        FieldKind::Long => "long",
        FieldKind::Float => "float",
        FieldKind::Decimal => "decimal",
        FieldKind::Boolean => "boolean",
        FieldKind::DateTime => "datetime",
        FieldKind::Date => "date",
        FieldKind::Time => "time",
        FieldKind::List(_) => "list",
        FieldKind::Dict(_) => "dict",
    }
}

pub(crate) fn json_shape(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn value_shape(value: &FieldValue) -> String {
    let name = match value {
        FieldValue::Text(_) => "text",
        FieldValue::Integer(_) => "integer",
        FieldValue::Float(_) => "float",
        FieldValue::Decimal(_) => "decimal",
        FieldValue::Boolean(_) => "boolean",
        FieldValue::DateTime(_) => "datetime",
        FieldValue::Date(_) => "date",
        FieldValue::Time(_) => "time",
        FieldValue::List(_) => "list",
        FieldValue::Dict(_) => "dict",
        FieldValue::Json(_) => "json",
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn roundtrip(field: &Field, value: FieldValue) {
        let encoded = field.encode(&value).unwrap();
        let decoded = field.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn scalar_roundtrips() {
        roundtrip(&Field::text(), FieldValue::Text("hello".into()));
        roundtrip(&Field::integer(), FieldValue::Integer(-42));
        roundtrip(&Field::long(), FieldValue::Integer(i64::MAX));
        roundtrip(&Field::float(), FieldValue::Float(2.5));
        roundtrip(&Field::boolean(), FieldValue::Boolean(true));
    }

    #[test]
    fn decimal_roundtrip_keeps_precision() {
        let field = Field::decimal();
        let value = FieldValue::Decimal("1234567890.123456789012345678".parse().unwrap());
        let encoded = field.encode(&value).unwrap();
        // text encoding, never a JSON float
        assert_eq!(encoded, json!("1234567890.123456789012345678"));
        assert_eq!(field.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn decimal_trailing_zeros_survive() {
        let field = Field::decimal();
        let value = FieldValue::Decimal("1.100".parse().unwrap());
        let encoded = field.encode(&value).unwrap();
        assert_eq!(encoded, json!("1.100"));
        assert_eq!(field.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn temporal_roundtrips() {
        let dt = Utc.with_ymd_and_hms(2010, 4, 1, 12, 30, 45).unwrap();
        roundtrip(&Field::datetime(), FieldValue::DateTime(dt));
        roundtrip(
            &Field::date(),
            FieldValue::Date(NaiveDate::from_ymd_opt(2010, 4, 1).unwrap()),
        );
        roundtrip(
            &Field::time(),
            FieldValue::Time(NaiveTime::from_hms_micro_opt(12, 30, 45, 123456).unwrap()),
        );
    }

    #[test]
    fn datetime_encodes_as_utc_text() {
        let dt = Utc.with_ymd_and_hms(2010, 4, 1, 12, 30, 45).unwrap();
        let encoded = Field::datetime().encode(&FieldValue::DateTime(dt)).unwrap();
        assert_eq!(encoded, json!("2010-04-01T12:30:45.000000Z"));
    }

    #[test]
    fn datetime_decode_is_strict() {
        let err = Field::datetime().decode(&json!("2010-04-01")).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { .. }));
        let err = Field::datetime().decode(&json!(12345)).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { .. }));
    }

    #[test]
    fn list_preserves_order() {
        let field = Field::list(Field::integer());
        let value = FieldValue::List(vec![
            FieldValue::Integer(3),
            FieldValue::Integer(1),
            FieldValue::Integer(2),
        ]);
        let encoded = field.encode(&value).unwrap();
        assert_eq!(encoded, json!([3, 1, 2]));
        assert_eq!(field.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn list_rejects_scalar() {
        let field = Field::list(Field::text());
        let err = field.decode(&json!("not a list")).unwrap_err();
        assert_eq!(
            err,
            CodecError::SchemaMismatch {
                expected: "list",
                found: "string \"not a list\"".to_string(),
            }
        );
    }

    #[test]
    fn list_element_mismatch_surfaces() {
        let field = Field::list(Field::integer());
        let err = field.decode(&json!([1, "two", 3])).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { expected: "integer", .. }));
    }

    #[test]
    fn untyped_dict_passes_through() {
        let field = Field::dict();
        let raw = json!({"anything": ["goes", 1, null]});
        let decoded = field.decode(&raw).unwrap();
        assert_eq!(decoded, FieldValue::Json(raw.clone()));
        assert_eq!(field.encode(&decoded).unwrap(), raw);
    }

    #[test]
    fn integer_rejects_fraction() {
        let err = Field::integer().decode(&json!(1.5)).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { expected: "integer", .. }));
    }

    #[test]
    fn encode_rejects_wrong_variant() {
        let err = Field::text().encode(&FieldValue::Integer(1)).unwrap_err();
        assert_eq!(
            err,
            CodecError::SchemaMismatch {
                expected: "text",
                found: "integer".to_string(),
            }
        );
    }

    #[test]
    fn decimal_rejects_number() {
        // decimals are text-encoded; a raw JSON float is a shape violation
        let err = Field::decimal().decode(&json!(1.1)).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { expected: "decimal text", .. }));
    }
}
