//! Query-time full-text search helpers.
//!
//! The FTS5 virtual tables and their maintenance triggers are created in
//! `store::migrations`; this module holds the sanitizer and snippet-marker
//! logic federated search (`query::federated`) needs at query time, per
//! spec.md 4.6.3 steps 3-4.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// Sanitize free-text query input into an FTS5 `MATCH` expression: replace
/// runs of non-alphanumeric characters with a single space, lowercase, and
/// append `*` for a prefix match on the final term. An empty/blank input
/// returns `None`, signalling callers to fall back to a plain table scan.
pub fn sanitize_query(raw: &str) -> Option<String> {
    let cleaned = NON_ALPHANUMERIC
        .replace_all(raw, " ")
        .trim()
        .to_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    Some(format!("{cleaned}*"))
}

/// A short random token used to frame matched terms in FTS snippets so the
/// caller can re-highlight later without re-parsing HTML (spec.md 4.6.3
/// step 4: "allocate a random 10-bit highlightNonce"). Drawn from a fresh
/// v4 UUID's low bits rather than a dedicated RNG crate, matching how the
/// teacher already pulls in `uuid` for ephemeral token generation.
pub fn highlight_nonce() -> u16 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    raw & 0x3ff
}

/// Build the `snippet()` wrapper markers for a given nonce, matching
/// spec.md Testable Property 8's `{n}...{/n}` shape.
pub fn snippet_markers(nonce: u16) -> (String, String) {
    (format!("{{{nonce}}}"), format!("{{/{nonce}}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_and_prefixes() {
        assert_eq!(sanitize_query("foo bar!!"), Some("foo bar*".to_string()));
        assert_eq!(sanitize_query("   "), None);
        assert_eq!(sanitize_query(""), None);
    }

    #[test]
    fn markers_embed_nonce() {
        let (open, close) = snippet_markers(42);
        assert_eq!(open, "{42}");
        assert_eq!(close, "{/42}");
    }
}
