//! # Duration Parsing
//!
//! Parses the duration strings accepted in resource specs, e.g. `30s`, `1h30m`
//! or `1d`. A bare integer is read as seconds, matching how Vault itself
//! accepts TTL values.

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$").ok());

static SEGMENT_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h|d)").ok());

/// Parse a duration string into `std::time::Duration`
///
/// Accepts one or more `<number><unit>` segments with units `ms`, `s`, `m`,
/// `h` and `d`, or a plain number of seconds. Zero is valid.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = trimmed
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid duration '{trimmed}': {e}"))?;
        return Ok(Duration::from_secs(secs));
    }

    let lowered = trimmed.to_lowercase();
    let (Some(whole), Some(segment)) = (DURATION_REGEX.as_ref(), SEGMENT_REGEX.as_ref()) else {
        return Err(anyhow::anyhow!("Failed to compile duration regex"));
    };
    if !whole.is_match(&lowered) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{trimmed}'. Expected e.g. '90s', '15m', '1h30m' or '1d'"
        ));
    }

    let mut total = Duration::ZERO;
    for captures in segment.captures_iter(&lowered) {
        let (Some(number), Some(unit)) = (captures.name("number"), captures.name("unit")) else {
            return Err(anyhow::anyhow!("Invalid duration segment in '{trimmed}'"));
        };
        let number: u64 = number.as_str().parse().map_err(|e| {
            anyhow::anyhow!("Invalid duration number '{}' in '{trimmed}': {e}", number.as_str())
        })?;
        let part = match unit.as_str() {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            "d" => Duration::from_secs(number.saturating_mul(86_400)),
            other => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{other}' in duration '{trimmed}'. Expected: ms, s, m, h or d"
                ));
            }
        };
        total = total.saturating_add(part);
    }

    Ok(total)
}

/// Whole seconds of a JSON value that carries a duration
///
/// Vault echoes TTLs as integers while specs carry strings; both map onto
/// seconds here. Returns `None` for values that are neither.
#[must_use]
pub fn parse_duration_secs(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => parse_duration(s).ok().map(|d| d.as_secs()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_compound_and_bare() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1h0m10s").unwrap(), Duration::from_secs(3610));
        assert_eq!(parse_duration("3600").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 1H ").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5h").is_err());
        assert!(parse_duration("an hour").is_err());
    }

    #[test]
    fn test_json_seconds() {
        assert_eq!(parse_duration_secs(&json!(3600)), Some(3600));
        assert_eq!(parse_duration_secs(&json!("1h")), Some(3600));
        assert_eq!(parse_duration_secs(&json!("3600s")), Some(3600));
        assert_eq!(parse_duration_secs(&json!(true)), None);
        assert_eq!(parse_duration_secs(&json!("soon")), None);
    }
}
