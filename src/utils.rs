use chrono::Utc;
use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use crate::error::{RateLimitError, Result};

/// Source of "now" for rate limiting decisions, in whole seconds since the Unix epoch
pub trait Clock: Send + Sync + Debug {
    fn unix_now(&self) -> i64;
}

/// Wall clock of the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn unix_now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to the
/// limiter and the store and advance time from another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn unix_now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Time units accepted in tier window strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl Unit {
    /// Convert unit to seconds (duration)
    pub fn to_seconds(self) -> u64 {
        match self {
            Unit::Second => 1,
            Unit::Minute => 60,
            Unit::Hour => 3600,
            Unit::Day => 86400,
            Unit::Week => 604800,
        }
    }

    /// Resolve a unit suffix such as `s`, `min` or `hours`
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(Unit::Second),
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Unit::Minute),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Unit::Hour),
            "d" | "day" | "days" => Some(Unit::Day),
            "w" | "week" | "weeks" => Some(Unit::Week),
            _ => None,
        }
    }
}

/// Parse a human-readable duration (`"90s"`, `"1h"`, `"1h 30m"`, `"3600"`) into seconds.
///
/// A bare integer is taken as seconds. The result must be positive.
pub fn parse_duration(input: &str) -> Result<u64> {
    let invalid = || RateLimitError::InvalidDuration(input.to_string());

    let text = input.trim();
    if text.is_empty() {
        return Err(invalid());
    }

    if let Ok(seconds) = text.parse::<u64>() {
        return if seconds == 0 { Err(invalid()) } else { Ok(seconds) };
    }

    let mut total: u64 = 0;
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let amount: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = rest[digits_end..].trim_start();

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = Unit::from_suffix(&rest[..unit_end]).ok_or_else(invalid)?;
        rest = &rest[unit_end..];

        total = amount
            .checked_mul(unit.to_seconds())
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(invalid)?;
    }

    if total == 0 {
        return Err(invalid());
    }
    Ok(total)
}

/// Naming convention for access log keys: `namespace SEP service SEP consumer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    namespace: String,
    separator: String,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self {
            namespace: "ratelimit".to_string(),
            separator: ":".to_string(),
        }
    }
}

impl KeyScheme {
    pub fn new(namespace: impl Into<String>, separator: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let separator = separator.into();
        if namespace.is_empty() || separator.is_empty() {
            return Err(RateLimitError::Config(
                "Key namespace and separator must not be empty".to_string(),
            ));
        }
        Ok(Self {
            namespace,
            separator,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Build the access log key for a (service, consumer) pair
    pub fn access_log_key(&self, service: &str, consumer: &str) -> String {
        [self.namespace.as_str(), service, consumer].join(self.separator.as_str())
    }

    /// Glob pattern matching every access log key of this namespace
    pub fn pattern(&self) -> String {
        format!(
            "{}{}*",
            escape_glob(&self.namespace),
            escape_glob(&self.separator)
        )
    }

    /// Split a key back into (service, consumer).
    ///
    /// The consumer is everything after the last separator.
    pub fn parse_key<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = key
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(self.separator.as_str())?;
        let (service, consumer) = rest.rsplit_once(self.separator.as_str())?;
        if service.is_empty() || consumer.is_empty() {
            return None;
        }
        Some((service, consumer))
    }

    /// Consumers containing the separator would be misparsed by `parse_key`
    pub fn validate_consumer(&self, consumer: &str) -> Result<()> {
        if consumer.contains(self.separator.as_str()) {
            return Err(RateLimitError::InvalidArgument(format!(
                "consumer {:?} must not contain the key separator {:?}",
                consumer, self.separator
            )));
        }
        Ok(())
    }
}

fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Match `text` against a Redis-style glob supporting `*`, `?` and `\` escapes
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    backtrack = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        match backtrack {
            Some((star, matched)) => {
                pi = star + 1;
                ti = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert_eq!(Unit::Second.to_seconds(), 1);
        assert_eq!(Unit::Minute.to_seconds(), 60);
        assert_eq!(Unit::Hour.to_seconds(), 3600);
        assert_eq!(Unit::Day.to_seconds(), 86400);
        assert_eq!(Unit::Week.to_seconds(), 604800);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), 90);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert_eq!(parse_duration("1m").unwrap(), 60);
        assert_eq!(parse_duration("60").unwrap(), 60);
        assert_eq!(parse_duration("1h30m").unwrap(), 5400);
        assert_eq!(parse_duration(" 2 hours 5 minutes ").unwrap(), 7500);
        assert_eq!(parse_duration("1D").unwrap(), 86400);
        assert_eq!(parse_duration("1w").unwrap(), 604800);
    }

    #[test]
    fn test_equal_durations_normalize_identically() {
        assert_eq!(parse_duration("60s").unwrap(), parse_duration("1m").unwrap());
        assert_eq!(parse_duration("1h").unwrap(), parse_duration("3600").unwrap());
        assert_eq!(parse_duration("1d").unwrap(), parse_duration("24h").unwrap());
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for input in ["", "  ", "abc", "10x", "h", "0", "0s", "5m10", "-5s", "99999999999999999999w"] {
            let result = parse_duration(input);
            assert!(
                matches!(result, Err(RateLimitError::InvalidDuration(_))),
                "expected {:?} to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_key_scheme_roundtrip() {
        let keys = KeyScheme::default();
        let key = keys.access_log_key("search", "alice");
        assert_eq!(key, "ratelimit:search:alice");
        assert_eq!(keys.parse_key(&key), Some(("search", "alice")));
        assert_eq!(keys.pattern(), "ratelimit:*");
    }

    #[test]
    fn test_key_scheme_parse_rejects_foreign_keys() {
        let keys = KeyScheme::default();
        assert_eq!(keys.parse_key("other:search:alice"), None);
        assert_eq!(keys.parse_key("ratelimit:search"), None);
        assert_eq!(keys.parse_key("ratelimit::alice"), None);
    }

    #[test]
    fn test_validate_consumer() {
        let keys = KeyScheme::default();
        assert!(keys.validate_consumer("alice").is_ok());
        assert!(matches!(
            keys.validate_consumer("alice:bob"),
            Err(RateLimitError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_key_scheme_requires_separator() {
        assert!(KeyScheme::new("ns", "").is_err());
        assert!(KeyScheme::new("", ":").is_err());
        assert!(KeyScheme::new("ns", "|").is_ok());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("ratelimit:*", "ratelimit:search:alice"));
        assert!(!glob_match("ratelimit:*", "other:search:alice"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(glob_match("ns\\*:*", "ns*:x"));
        assert!(!glob_match("ns\\*:*", "nsX:x"));
    }

    #[test]
    fn test_escaped_namespace_pattern() {
        let keys = KeyScheme::new("rl*", ":").unwrap();
        let pattern = keys.pattern();
        assert!(glob_match(&pattern, "rl*:svc:c"));
        assert!(!glob_match(&pattern, "rlx:svc:c"));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        let shared = clock.clone();
        shared.advance(20);
        assert_eq!(clock.unix_now(), 120);
        clock.set(5);
        assert_eq!(shared.unix_now(), 5);
    }
}
