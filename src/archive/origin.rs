//! Origin/URL canonicalization shared by the Coordinator, every dataset
//! ingester, and the query surface (spec.md Glossary, "Origin"; 4.3.4;
//! 4.6.2; 6.3).

use url::Url;

use crate::error::{IndexError, Result};

/// Canonical `scheme://host[:port]` form of an archive or subject URL —
/// the indexing primary key for authorship (spec.md 3, `CrawlSource`).
pub fn canonicalize(input: &str) -> Result<String> {
    let url = Url::parse(input).map_err(|e| IndexError::InvalidUrl(format!("{input}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| IndexError::InvalidUrl(format!("{input}: missing host")))?;
    match url.port() {
        Some(port) => Ok(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Ok(format!("{}://{}", url.scheme(), host)),
    }
}

/// Split a full record URL into `(origin, pathname)` (spec.md 4.6.2,
/// `get(url)`). Fails with `InvalidUrl` on malformed input.
pub fn split(input: &str) -> Result<(String, String)> {
    let url = Url::parse(input).map_err(|e| IndexError::InvalidUrl(format!("{input}: {e}")))?;
    let origin = canonicalize(input)?;
    let path = url.path().to_string();
    Ok((origin, path))
}

/// Normalize a reaction topic URL: protocol + host + path + search + hash,
/// stripping a trailing slash (spec.md 4.3.4).
pub fn normalize_topic(input: &str) -> Result<String> {
    let url = Url::parse(input).map_err(|e| IndexError::InvalidUrl(format!("{input}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| IndexError::InvalidUrl(format!("{input}: missing host")))?;
    let mut out = format!("{}://{}{}", url.scheme(), host, url.path());
    if let Some(q) = url.query() {
        out.push('?');
        out.push_str(q);
    }
    if let Some(f) = url.fragment() {
        out.push('#');
        out.push_str(f);
    }
    if out.ends_with('/') && !out.ends_with("://") {
        out.pop();
    }
    Ok(out)
}

/// Slugify a URL-keyed filename (spec.md 6.3): drop the scheme prefix,
/// replace reserved/control characters with `-`, strip trailing dashes.
pub fn slugify(input: &str) -> String {
    let without_scheme = input.split_once("://").map(|(_, rest)| rest).unwrap_or(input);
    let mut out = String::with_capacity(without_scheme.len());
    for ch in without_scheme.chars() {
        if "<>:\"/\\|?*".contains(ch) || ch.is_control() {
            out.push('-');
        } else {
            out.push(ch);
        }
    }
    out.trim_end_matches('-').to_string()
}

/// ISO-8601 UTC millisecond-precision timestamp filename, bumping by 1ms
/// on collision so filenames are strictly increasing (spec.md 6.3).
/// `exists` reports whether a candidate filename is already taken.
pub fn timestamp_filename(mut now_ms: i64, mut exists: impl FnMut(&str) -> bool) -> String {
    loop {
        let name = format!("{}.json", millis_to_rfc3339(now_ms));
        if !exists(&name) {
            return name;
        }
        now_ms += 1;
    }
}

fn millis_to_rfc3339(ms: i64) -> String {
    use chrono::TimeZone;
    let dt = chrono::Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| chrono::Utc.timestamp_opt(0, 0).single().unwrap());
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_drops_path() {
        assert_eq!(
            canonicalize("dat://abc123/data/posts/x.json").unwrap(),
            "dat://abc123"
        );
    }

    #[test]
    fn split_returns_origin_and_pathname() {
        let (origin, path) = split("dat://abc123/data/posts/x.json").unwrap();
        assert_eq!(origin, "dat://abc123");
        assert_eq!(path, "/data/posts/x.json");
    }

    #[test]
    fn normalize_topic_strips_trailing_slash() {
        assert_eq!(
            normalize_topic("https://example.com/post/").unwrap(),
            "https://example.com/post"
        );
    }

    #[test]
    fn slugify_replaces_reserved_characters() {
        assert_eq!(slugify("https://x.com/a:b?c"), "x.com-a-b-c");
    }

    #[test]
    fn timestamp_filename_bumps_on_collision() {
        let mut taken = std::collections::HashSet::new();
        taken.insert("2020-01-01T00:00:00.000Z.json".to_string());
        let name = timestamp_filename(1577836800000, |n| taken.contains(n));
        assert_eq!(name, "2020-01-01T00:00:00.001Z.json");
    }
}
