//! Safe coercion of untrusted dynamic values into numbers and timestamps.
//!
//! Every inbound payload field passes through these helpers (directly or via the
//! [`lenient`] serde adapters), so a bad scalar degrades to "unknown" instead of
//! failing the whole message.

use crate::error::SyncError;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

/// Epoch values below this magnitude are seconds, at or above it milliseconds.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Rendered timestamp layout (zero padded, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Coerce a dynamic value into a finite number.
///
/// Numbers and numeric strings convert; `null`, booleans, empty strings, arrays, objects
/// and non-finite results (`NaN`, `inf`) yield `None`.
pub fn to_number_or_null(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|v| v.is_finite()),
        Value::String(raw) => parse_number(raw),
        _ => None,
    }
}

/// Parse a decimal string into a finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert an epoch value (seconds or milliseconds, disambiguated by magnitude) to UTC.
pub fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() {
        return None;
    }
    let millis = if raw.abs() < EPOCH_MILLIS_THRESHOLD {
        raw * 1000.0
    } else {
        raw
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

/// Coerce a dynamic value (epoch number, numeric string or date string) into a UTC timestamp.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number.as_f64().and_then(from_epoch),
        Value::String(raw) => parse_timestamp_str(raw),
        _ => None,
    }
}

/// Parse a timestamp string. Offset-less date/times are interpreted as UTC.
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(epoch) = parse_number(trimmed) {
        return from_epoch(epoch);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a dynamic timestamp value as `YYYY-MM-DD HH:MM:SS` in the given zone.
///
/// Returns an empty string when the value cannot be interpreted as a timestamp.
pub fn to_iso_timestamp(value: &Value, zone: &DisplayZone) -> String {
    parse_timestamp(value)
        .map(|time| format_timestamp(time, zone))
        .unwrap_or_default()
}

/// Render an already parsed timestamp as `YYYY-MM-DD HH:MM:SS` in the given zone.
pub fn format_timestamp(time: DateTime<Utc>, zone: &DisplayZone) -> String {
    match zone {
        DisplayZone::Utc => time.format(TIMESTAMP_FORMAT).to_string(),
        DisplayZone::Local => time.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
        DisplayZone::Fixed(offset) => time.with_timezone(offset).format(TIMESTAMP_FORMAT).to_string(),
        DisplayZone::Named(tz) => time.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Time zone used when rendering timestamps for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    #[default]
    Utc,
    Local,
    Fixed(FixedOffset),
    /// IANA zone, daylight saving aware
    Named(Tz),
}

impl DisplayZone {
    /// Resolve a zone name (`UTC`, `local`, `+02:00`, `Europe/Paris`), memoizing
    /// the result per name.
    ///
    /// Unresolvable names fall back to UTC.
    pub fn cached(name: &str) -> DisplayZone {
        static ZONES: OnceLock<Mutex<HashMap<String, DisplayZone>>> = OnceLock::new();
        let zones = ZONES.get_or_init(|| Mutex::new(HashMap::new()));

        let mut guard = zones.lock();
        if let Some(zone) = guard.get(name) {
            return *zone;
        }

        let zone = name.parse().unwrap_or_else(|error| {
            debug!(zone = name, %error, "unresolvable display zone, using UTC");
            DisplayZone::Utc
        });
        guard.insert(name.to_string(), zone);
        zone
    }
}

impl FromStr for DisplayZone {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();

        match lower.as_str() {
            "utc" | "z" | "gmt" | "etc/utc" => return Ok(DisplayZone::Utc),
            "local" => return Ok(DisplayZone::Local),
            _ => {}
        }

        let offset = lower
            .strip_prefix("utc")
            .or_else(|| lower.strip_prefix("gmt"))
            .unwrap_or(&lower);

        parse_offset(offset)
            .map(DisplayZone::Fixed)
            .or_else(|| trimmed.parse::<Tz>().ok().map(DisplayZone::Named))
            .ok_or_else(|| SyncError::Config {
                key: "DISPLAY_TZ".to_string(),
                reason: format!("unsupported time zone `{trimmed}`"),
            })
    }
}

/// Parse `+HH`, `+HHMM` or `+HH:MM` (and the `-` variants) into a fixed offset.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<i32>().ok()?, 0)
    } else {
        let split = digits.len() - 2;
        (digits[..split].parse::<i32>().ok()?, digits[split..].parse::<i32>().ok()?)
    };

    if hours > 14 || minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Serde adapters that never fail on a bad scalar.
///
/// Use with `#[serde(default, deserialize_with = "...")]` so missing fields also
/// resolve to the "unknown" value.
pub mod lenient {
    use super::{parse_timestamp, to_number_or_null};
    use chrono::{DateTime, Utc};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(to_number_or_null(&value))
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(parse_timestamp(&value))
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(scalar_to_string(&value).unwrap_or_default())
    }

    /// Non-empty string or `None`.
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(scalar_to_string(&value).filter(|s| !s.is_empty()))
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value_to_flag(&value).unwrap_or(false))
    }

    pub fn opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value_to_flag(&value))
    }

    /// Parse a string-backed enumeration, falling back to its default.
    pub fn parsed<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default())
    }

    pub fn parsed_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().and_then(|raw| raw.parse().ok()))
    }

    /// Decode a nested object, falling back to its default on `null` or a wrong shape.
    pub fn object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    fn scalar_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(raw) => Some(raw.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    fn value_to_flag(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => number.as_f64().map(|v| v != 0.0),
            Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}
