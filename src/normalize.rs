//! Coercion of untrusted numeric payload fields.
//!
//! The analytics service sends numbers as JSON numbers, numeric strings,
//! `null`, or not at all. Everything numeric that enters dashboard state goes
//! through here so later arithmetic never sees NaN or infinity. Bad input
//! degrades to the caller's fallback instead of failing the decode.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn finite(raw: Option<&Value>) -> Option<f64> {
    let value = match raw? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Finite number from a loosely typed field, or `fallback`.
pub fn to_number(raw: Option<&Value>, fallback: f64) -> f64 {
    match finite(raw) {
        Some(value) => value,
        None if fallback.is_finite() => fallback,
        None => 0.0,
    }
}

/// Integer from a loosely typed field, truncating fractions, or `fallback`.
pub fn to_int(raw: Option<&Value>, fallback: i64) -> i64 {
    finite(raw)
        .map(f64::trunc)
        .filter(|v| *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
        .map(|v| v as i64)
        .unwrap_or(fallback)
}

pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(to_number(raw.as_ref(), 0.0))
}

pub fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(finite(raw.as_ref()))
}

pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(to_int(raw.as_ref(), 0))
}

pub fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(u32::try_from(to_int(raw.as_ref(), 0)).unwrap_or(0))
}

/// Non-negative integer, or `None` for null, garbage and negatives.
pub fn lenient_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(finite(raw.as_ref()).and_then(|v| u32::try_from(v.trunc() as i64).ok()))
}

/// String field that tolerates `null`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
