//! Rejects obviously-synthetic content before it reaches disk.
//!
//! Every `add()` call checks content, project, and tags against these
//! patterns. The stance is conservative reject-by-default with no override
//! flag, so a caller can't accidentally (or deliberately) punch a hole in
//! the one safeguard that keeps placeholder content out of the store.

use once_cell::sync::Lazy;
use regex::Regex;

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)mock-\d+",
        r"(?i)test.*data",
        r"(?i)sample.*content",
        r"(?i)lorem ipsum",
        r"(?i)fake.*data",
        r"(?i)placeholder",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("mock-data pattern is valid"))
    .collect()
});

/// Returns the first matching pattern's description, if any field looks
/// synthetic.
pub fn detect_mock_data(content: &str, project: &str, tags: &[String]) -> Option<&'static str> {
    for pattern in PATTERNS.iter() {
        if pattern.is_match(content) || pattern.is_match(project) || tags.iter().any(|t| pattern.is_match(t)) {
            return Some("content matches a known mock-data pattern");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_mock_numbered_content() {
        assert!(detect_mock_data("this is mock-42 data", "default", &[]).is_some());
    }

    #[test]
    fn flags_lorem_ipsum() {
        assert!(detect_mock_data("Lorem ipsum dolor sit amet", "default", &[]).is_some());
    }

    #[test]
    fn flags_placeholder_tag() {
        assert!(detect_mock_data("real content here", "default", &["placeholder".into()]).is_some());
    }

    #[test]
    fn allows_genuine_content() {
        assert!(detect_mock_data("Use exponential backoff on 429 responses", "api", &["rate-limit".into()])
            .is_none());
    }
}
