//! Lenient field decoders for upstream JSON.
//!
//! The metric stream and the analytics API are not strict about number types:
//! numbers arrive as JSON numbers, numeric strings or `null`. A value that cannot
//! be read decodes as `None` instead of failing the whole frame.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Epoch values below this are seconds, at or above it milliseconds.
const EPOCH_MILLIS_CUTOFF: f64 = 100_000_000_000.0;

pub fn opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_as_f64))
}

pub fn opt_u64<'de, D>(d: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(|v| {
        v.as_u64().or_else(|| {
            value_as_f64(v)
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.round() as u64)
        })
    }))
}

pub fn opt_bool<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|i| i != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Any `T` decodable from the raw value; a value of the wrong JSON type
/// (e.g. a number where a label string is expected) becomes `None`.
pub fn opt_lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| serde_json::from_value(v).ok()))
}

/// RFC 3339 string, or epoch seconds / milliseconds as number or string.
pub fn opt_timestamp<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_as_timestamp))
}

fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

fn value_as_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    if let Some(s) = v.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let n = value_as_f64(v).filter(|n| n.is_finite() && *n >= 0.0)?;
    let millis = if n < EPOCH_MILLIS_CUTOFF { n * 1000.0 } else { n };
    Utc.timestamp_millis_opt(millis as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "opt_f64")]
        num: Option<f64>,
        #[serde(default, deserialize_with = "opt_u64")]
        count: Option<u64>,
        #[serde(default, deserialize_with = "opt_bool")]
        flag: Option<bool>,
        #[serde(default, deserialize_with = "opt_timestamp")]
        ts: Option<DateTime<Utc>>,
    }

    fn probe(raw: &str) -> Probe {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn numbers_accept_strings_and_null() {
        assert_eq!(probe(r#"{"num": 1.5}"#).num, Some(1.5));
        assert_eq!(probe(r#"{"num": "2.25"}"#).num, Some(2.25));
        assert_eq!(probe(r#"{"num": null}"#).num, None);
        assert_eq!(probe(r#"{"num": "n/a"}"#).num, None);
        assert_eq!(probe(r#"{}"#).num, None);
    }

    #[test]
    fn counts_round_floats() {
        assert_eq!(probe(r#"{"count": 12}"#).count, Some(12));
        assert_eq!(probe(r#"{"count": "7"}"#).count, Some(7));
        assert_eq!(probe(r#"{"count": 3.0}"#).count, Some(3));
        assert_eq!(probe(r#"{"count": -1}"#).count, None);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(probe(r#"{"flag": true}"#).flag, Some(true));
        assert_eq!(probe(r#"{"flag": 0}"#).flag, Some(false));
        assert_eq!(probe(r#"{"flag": "yes"}"#).flag, Some(true));
        assert_eq!(probe(r#"{"flag": "maybe"}"#).flag, None);
    }

    #[test]
    fn timestamps_accept_rfc3339_and_epoch() {
        let rfc = probe(r#"{"ts": "2024-03-01T12:00:00Z"}"#).ts.unwrap();
        let millis = probe(r#"{"ts": 1709294400000}"#).ts.unwrap();
        let secs = probe(r#"{"ts": 1709294400}"#).ts.unwrap();
        assert_eq!(rfc, millis);
        assert_eq!(rfc, secs);
        assert!(probe(r#"{"ts": "yesterday"}"#).ts.is_none());
    }
}
