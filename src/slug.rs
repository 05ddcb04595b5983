//! Slug validation and generation.
//!
//! Slugs become store key segments, so anything that could escape the
//! hierarchy (separators, `..`, empty strings) is rejected outright.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// Maximum slug length.
pub const MAX_SLUG_LENGTH: usize = 50;

/// Lowercase alphanumeric with inner hyphens, 1-50 characters.
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,48}[a-z0-9])?$").unwrap());

static NON_SLUG_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());

static HYPHEN_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

/// Check that `slug` is safe to use as a storage identifier.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(Error::Validation("slug is required".to_string()));
    }
    if slug.contains("..") || slug.contains('/') || slug.contains('\\') {
        return Err(Error::Validation(format!(
            "invalid slug {:?}: path separators are not allowed",
            slug
        )));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(Error::Validation(format!(
            "invalid slug {:?}: must be lowercase alphanumeric with hyphens, at most {} characters",
            slug, MAX_SLUG_LENGTH
        )));
    }
    Ok(())
}

/// Reject empty or whitespace-only values for a required field.
pub fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Derive a slug from free text. May return an empty string when the input
/// has no usable characters; callers validate the result.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase().replace([' ', '_'], "-");
    let stripped = NON_SLUG_CHARS_RE.replace_all(&lowered, "");
    let collapsed = HYPHEN_RUN_RE.replace_all(&stripped, "-");
    let mut slug = collapsed.trim_matches('-').to_string();

    if slug.len() > MAX_SLUG_LENGTH {
        slug.truncate(MAX_SLUG_LENGTH);
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        for slug in ["a", "demo", "add-auth", "v2", "0-9", &"a".repeat(50)] {
            assert!(validate_slug(slug).is_ok(), "{} should be valid", slug);
        }
    }

    #[test]
    fn test_invalid_slugs() {
        let long = "a".repeat(51);
        let cases = [
            "",
            "..",
            "../etc",
            "a/b",
            "a\\b",
            "-leading",
            "trailing-",
            "Upper",
            "with space",
            "dot.ted",
            "under_score",
            long.as_str(),
        ];
        for slug in cases {
            assert!(
                matches!(validate_slug(slug), Err(Error::Validation(_))),
                "{:?} should be rejected",
                slug
            );
        }
    }

    #[test]
    fn test_require() {
        assert!(require("title", "Demo").is_ok());
        assert!(require("title", "").is_err());
        assert!(require("title", "   ").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add user authentication"), "add-user-authentication");
        assert_eq!(slugify("  Fix: the_bug!! "), "fix-the-bug");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_truncates_without_trailing_hyphen() {
        let text = format!("{} tail", "x".repeat(49));
        let slug = slugify(&text);
        assert!(slug.len() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
        assert!(validate_slug(&slug).is_ok());
    }
}
