//! Source-specific identifiers derived from the original URL.

use std::sync::OnceLock;

use regex::Regex;

/// Known URL shapes carrying a status identifier, in match order.
const SOURCE_ID_PATTERNS: &[&str] = &[
    r"(?:^|[/.])(?:twitter|x)\.com/\w+/status/(\d+)",
    r"(?:^|[/.])(?:twitter|x)\.com/i/status/(\d+)",
    r"(?:^|[/.])(?:twitter|x)\.com/\w+/statuses/(\d+)",
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SOURCE_ID_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("source id pattern is valid"))
            .collect()
    })
}

/// The identifier captured by the first matching pattern.
///
/// The result is always a substring of `original_url`.
pub fn extract_source_id(original_url: &str) -> Option<String> {
    patterns().iter().find_map(|re| {
        re.captures(original_url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}
