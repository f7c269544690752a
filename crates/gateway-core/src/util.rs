//! Small pure helpers shared across the pipeline.

/// Quotes `s` as a single POSIX shell argument: wraps it in single quotes,
/// escaping embedded single quotes as `'\''`. Used by the launcher glue
/// that shells out to the compression CLI fallback; kept here because it
/// is a pure, independently testable property (spec.md §8).
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Canonical sentinel prefix/suffix the gateway scans for and emits.
pub const SENTINEL_PREFIX: &str = "<<<SHADOW:";
pub const SENTINEL_SUFFIX: &str = ">>>";

/// Builds the literal sentinel for a shadow id, e.g. `<<<SHADOW:shadow_abc>>>`.
pub fn make_sentinel(shadow_id: &str) -> String {
    format!("{}{}{}", SENTINEL_PREFIX, shadow_id, SENTINEL_SUFFIX)
}

/// Scans `text` for shadow sentinels, accepting both the literal form and
/// the JSON-escaped `<<<SHADOW:...>>>` form
/// (spec.md §6). Returns every shadow id found, in order of appearance.
pub fn find_sentinels(text: &str) -> Vec<String> {
    let normalized = text
        .replace("\\u003c", "<")
        .replace("\\u003e", ">")
        .replace("\\u003C", "<")
        .replace("\\u003E", ">");

    let mut ids = Vec::new();
    let mut rest = normalized.as_str();
    while let Some(start) = rest.find(SENTINEL_PREFIX) {
        let after_prefix = &rest[start + SENTINEL_PREFIX.len()..];
        if let Some(end) = after_prefix.find(SENTINEL_SUFFIX) {
            let id = &after_prefix[..end];
            if is_valid_shadow_id(id) {
                ids.push(id.to_string());
            }
            rest = &after_prefix[end + SENTINEL_SUFFIX.len()..];
        } else {
            break;
        }
    }
    ids
}

fn is_valid_shadow_id(id: &str) -> bool {
    id.starts_with("shadow_")
        && id[7..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && id.len() > 7
}

/// Compression threshold header values (spec.md §6): maps the enumerated
/// `X-Compression-Threshold` tokens to a byte count, or `None` for `off`.
pub fn parse_compression_threshold(value: &str) -> Option<Option<usize>> {
    match value {
        "off" => Some(None),
        "256" => Some(Some(256)),
        "1k" => Some(Some(1024)),
        "2k" => Some(Some(2 * 1024)),
        "4k" => Some(Some(4 * 1024)),
        "8k" => Some(Some(8 * 1024)),
        "16k" => Some(Some(16 * 1024)),
        "32k" => Some(Some(32 * 1024)),
        "64k" => Some(Some(64 * 1024)),
        "128k" => Some(Some(128 * 1024)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_round_trips_via_posix_shell_semantics() {
        let cases = ["plain", "has space", "it's quoted", "''", "a'b'c", ""];
        for case in cases {
            let quoted = shell_quote(case);
            assert!(quoted.starts_with('\''));
            assert!(quoted.ends_with('\''));
            // Reconstruct what a POSIX shell would expand `quoted` to: split
            // on the escape sequence and stitch literal single quotes back in.
            let expanded = quoted
                .trim_start_matches('\'')
                .trim_end_matches('\'')
                .replace("'\\''", "'");
            assert_eq!(expanded, case);
        }
    }

    #[test]
    fn sentinel_round_trip() {
        let sentinel = make_sentinel("shadow_abc123");
        assert_eq!(sentinel, "<<<SHADOW:shadow_abc123>>>");
        assert_eq!(find_sentinels(&sentinel), vec!["shadow_abc123".to_string()]);
    }

    #[test]
    fn sentinel_json_escaped_form_is_accepted() {
        let escaped = "\\u003c\\u003c\\u003cSHADOW:shadow_xyz\\u003e\\u003e\\u003e";
        assert_eq!(find_sentinels(escaped), vec!["shadow_xyz".to_string()]);
    }

    #[test]
    fn sentinel_rejects_malformed_ids() {
        assert!(find_sentinels("<<<SHADOW:not-shadow-prefixed>>>").is_empty());
    }

    #[test]
    fn threshold_parsing() {
        assert_eq!(parse_compression_threshold("off"), Some(None));
        assert_eq!(parse_compression_threshold("4k"), Some(Some(4096)));
        assert_eq!(parse_compression_threshold("nonsense"), None);
    }
}
