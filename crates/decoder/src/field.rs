//! Column value -> JSON value, one dispatch over the column kind

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::DateTime;
use chrono_tz::Tz;
use contracts::{ColumnKind, ColumnValue};
use serde_json::{Number, Value};

/// `yyyy-MM-dd HH:mm:ss.SSS`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Encode one value of a column of `kind`
///
/// NULL is `null` for every kind. Decimals stay text so no precision is lost,
/// timestamps (µs since epoch) are formatted in `zone`, varbinary is base64.
///
/// # Errors
/// A message describing the mismatch when the value does not fit the kind.
pub fn encode_value(kind: ColumnKind, value: &ColumnValue, zone: &Tz) -> Result<Value, String> {
    match (kind, value) {
        (_, ColumnValue::Null) => Ok(Value::Null),

        (ColumnKind::TinyInt, ColumnValue::Integer(v)) => integral::<i8>(*v, kind),
        (ColumnKind::SmallInt, ColumnValue::Integer(v)) => integral::<i16>(*v, kind),
        (ColumnKind::Integer, ColumnValue::Integer(v)) => integral::<i32>(*v, kind),
        (ColumnKind::BigInt, ColumnValue::Integer(v)) => Ok(Value::from(*v)),

        (ColumnKind::Float, ColumnValue::Float(v)) => Number::from_f64(*v)
            .map(Value::Number)
            .ok_or_else(|| format!("{v} is not a finite float")),
        (ColumnKind::Float, ColumnValue::Integer(v)) => Ok(Value::from(*v as f64)),

        (ColumnKind::Decimal, ColumnValue::Text(text)) => {
            let text = text.trim();
            if text.parse::<f64>().is_ok_and(f64::is_finite) {
                Ok(Value::String(text.to_string()))
            } else {
                Err(format!("'{text}' is not a decimal"))
            }
        }
        (ColumnKind::Decimal, ColumnValue::Integer(v)) => Ok(Value::String(v.to_string())),
        (ColumnKind::Decimal, ColumnValue::Float(v)) if v.is_finite() => {
            Ok(Value::String(v.to_string()))
        }

        (ColumnKind::String, ColumnValue::Text(text)) => Ok(Value::String(text.clone())),

        (ColumnKind::Timestamp, ColumnValue::Integer(micros)) => DateTime::from_timestamp_micros(*micros)
            .map(|ts| {
                Value::String(ts.with_timezone(zone).format(TIMESTAMP_FORMAT).to_string())
            })
            .ok_or_else(|| format!("timestamp {micros}µs is out of range")),

        (ColumnKind::VarBinary, ColumnValue::Bytes(bytes)) => {
            Ok(Value::String(BASE64_STANDARD.encode(bytes)))
        }

        (kind, value) => Err(format!("{} value does not fit a {kind:?} column", value_kind(value))),
    }
}

fn integral<T: TryFrom<i64>>(v: i64, kind: ColumnKind) -> Result<Value, String> {
    T::try_from(v)
        .map(|_| Value::from(v))
        .map_err(|_| format!("{v} is out of range for a {kind:?} column"))
}

fn value_kind(value: &ColumnValue) -> &'static str {
    match value {
        ColumnValue::Null => "null",
        ColumnValue::Integer(_) => "integer",
        ColumnValue::Float(_) => "float",
        ColumnValue::Text(_) => "text",
        ColumnValue::Bytes(_) => "binary",
    }
}
