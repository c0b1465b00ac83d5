//! Human-readable duration parsing and formatting.
//!
//! Supports components: `Xy`, `Xw`, `Xd`, `Xh`, `Xm`, `Xs`, `Xms`.
//! Components can be combined: "2h30m", "1d12h", "90s". A bare number is
//! read as seconds.

use std::time::Duration;

use crate::error::CoreError;

const UNITS: &[(&str, u64)] = &[
    ("y", 365 * 86_400_000),
    ("w", 7 * 86_400_000),
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

fn unit_millis(unit: &str) -> Option<u64> {
    UNITS.iter().find(|(u, _)| *u == unit).map(|(_, ms)| *ms)
}

/// Parse a duration string such as `"15s"` or `"1h30m"`.
pub fn parse_duration(s: &str) -> Result<Duration, CoreError> {
    let invalid = || CoreError::InvalidDuration(s.to_string());
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_ms: u64 = 0;
    let mut num_buf = String::new();
    let mut unit_buf = String::new();
    let mut found_unit = false;

    let mut flush = |num: &mut String, unit: &mut String| -> Result<(), CoreError> {
        let n: u64 = num.parse().map_err(|_| invalid())?;
        let ms = unit_millis(unit).ok_or_else(invalid)?;
        total_ms = n
            .checked_mul(ms)
            .and_then(|v| total_ms.checked_add(v))
            .ok_or_else(invalid)?;
        num.clear();
        unit.clear();
        Ok(())
    };

    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            if !unit_buf.is_empty() {
                flush(&mut num_buf, &mut unit_buf)?;
            }
            num_buf.push(ch);
        } else if ch.is_ascii_alphabetic() {
            if num_buf.is_empty() {
                return Err(invalid());
            }
            unit_buf.push(ch);
            found_unit = true;
        } else {
            return Err(invalid());
        }
    }

    if !unit_buf.is_empty() {
        flush(&mut num_buf, &mut unit_buf)?;
    } else if !num_buf.is_empty() {
        // Trailing digits after a unit ("30m15") are ambiguous.
        if found_unit {
            return Err(invalid());
        }
        let n: u64 = num_buf.parse().map_err(|_| invalid())?;
        total_ms = n.checked_mul(1_000).ok_or_else(invalid)?;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Format a duration using the largest whole units, e.g. `1m30s`.
pub fn format_duration(d: Duration) -> String {
    let mut ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in UNITS {
        if ms >= *size {
            out.push_str(&format!("{}{}", ms / size, unit));
            ms %= size;
        }
    }
    out
}

/// Serde adapter for `Duration` fields written as duration strings.
pub mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional duration strings; absent and empty both map to `None`.
pub mod serde_opt_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&super::format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_duration(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
