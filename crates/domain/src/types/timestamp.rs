//! Lenient unix-timestamp decoding for persisted files.
//!
//! Files written by older tooling store `time` as an integer, a float
//! (`1700000000.25`) or a local `"%Y-%m-%d %H:%M:%S"` string. All three
//! decode to whole unix seconds; writes always use the integer form.

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer};

/// Text layout used by older session files.
pub const LEGACY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

/// `deserialize_with` target for unix-second fields.
///
/// # Errors
///
/// Fails when the value is none of the accepted shapes.
pub fn unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Int(secs) => Ok(secs),
        RawTimestamp::Float(secs) => float_seconds(secs).ok_or_else(|| {
            serde::de::Error::custom(format!("timestamp {secs} is out of range"))
        }),
        RawTimestamp::Text(text) => parse_text(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("unrecognised timestamp {text:?}"))
        }),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_seconds(secs: f64) -> Option<i64> {
    (secs.is_finite() && secs.abs() < 9.0e15).then(|| secs.trunc() as i64)
}

/// Integer or float text, or a local date-time in [`LEGACY_TIME_FORMAT`].
pub fn parse_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(secs) = text.parse::<f64>() {
        return float_seconds(secs);
    }
    let naive = NaiveDateTime::parse_from_str(text, LEGACY_TIME_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest().map(|at| at.timestamp())
}
