//! Hand-rolled per-field validation shared by every dataset payload
//! (spec.md 6.5). Grounded on the teacher's `BackendEntry::from_value`
//! (`config.rs`), which hand-checks shape rather than invoking a generic
//! JSON-Schema engine — no crate in the example corpus pulls one in for
//! this kind of boundary check.

use once_cell::sync::Lazy;
use regex::Regex;

/// `^[A-Za-z][A-Za-z0-9\-_?]*$` (spec.md 6.5).
pub static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9\-_?]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

fn err(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError {
        field,
        reason: reason.into(),
    }
}

/// Non-empty, required string field.
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(err(field, "required"));
    }
    Ok(())
}

/// Caps a field's length in chars (spec.md 6.5: body <= 1,000,000, title <= 280).
pub fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(err(field, format!("exceeds max length {max}")));
    }
    Ok(())
}

/// `format: uri` (spec.md 6.5) — must parse as an absolute URL.
pub fn require_uri(field: &'static str, value: &str) -> Result<(), ValidationError> {
    url::Url::parse(value).map_err(|e| err(field, format!("not a valid uri: {e}")))?;
    Ok(())
}

/// Validates every tag against [`TAG_PATTERN`].
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    for tag in tags {
        if !TAG_PATTERN.is_match(tag) {
            return Err(err("tags", format!("invalid tag: {tag}")));
        }
    }
    Ok(())
}

/// Coerce an ISO-8601 timestamp to epoch milliseconds; `None`/unparsable
/// input normalizes to `0` (spec.md 4.3.1, "set `updatedAt = 0` when
/// absent or invalid").
pub fn normalize_timestamp(value: Option<&str>) -> i64 {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_pattern_accepts_and_rejects() {
        assert!(TAG_PATTERN.is_match("rust-lang"));
        assert!(TAG_PATTERN.is_match("q?"));
        assert!(!TAG_PATTERN.is_match("1rust"));
        assert!(!TAG_PATTERN.is_match(""));
    }

    #[test]
    fn normalize_timestamp_defaults_to_zero() {
        assert_eq!(normalize_timestamp(None), 0);
        assert_eq!(normalize_timestamp(Some("not a date")), 0);
        assert_eq!(
            normalize_timestamp(Some("2020-01-01T00:00:00.000Z")),
            1577836800000
        );
    }

    #[test]
    fn max_len_counts_chars_not_bytes() {
        assert!(max_len("title", "hello", 10).is_ok());
        assert!(max_len("title", &"x".repeat(11), 10).is_err());
    }
}
