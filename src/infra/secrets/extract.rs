//! Secret reference extraction.
//!
//! Recognizes delimiter-wrapped references such as `{{ op://vault/item/field }}`
//! in a single text value. Delimiters are literal substrings matched at the
//! very start and end of the value; nothing in between is scanned.

use super::types::REFERENCE_SCHEME;

/// Default opening delimiter.
pub const DEFAULT_PREFIX: &str = "{{";

/// Default closing delimiter.
pub const DEFAULT_SUFFIX: &str = "}}";

/// Outcome of inspecting one value. Both variants borrow from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<'a> {
    /// Not a secret reference; use this text as-is.
    ///
    /// This is the untouched input when the delimiters did not match, and the
    /// trimmed inner text when they did but the scheme is missing.
    PassThrough(&'a str),
    /// A reference to resolve, delimiters stripped and whitespace trimmed.
    Reference(&'a str),
}

impl<'a> Extraction<'a> {
    pub fn is_reference(&self) -> bool {
        matches!(self, Extraction::Reference(_))
    }

    pub fn as_str(&self) -> &'a str {
        match *self {
            Extraction::PassThrough(s) | Extraction::Reference(s) => s,
        }
    }
}

/// Classify `value` against the `prefix`/`suffix` delimiter pair.
pub fn extract<'a>(value: &'a str, prefix: &str, suffix: &str) -> Extraction<'a> {
    if value.is_empty() {
        return Extraction::PassThrough(value);
    }

    if !value.starts_with(prefix) || !value.ends_with(suffix) {
        return Extraction::PassThrough(value);
    }

    // One occurrence each. The suffix may already be consumed when the
    // delimiters overlap; then nothing more is stripped.
    let inner = &value[prefix.len()..];
    let inner = inner.strip_suffix(suffix).unwrap_or(inner).trim();

    if inner.starts_with(REFERENCE_SCHEME) {
        Extraction::Reference(inner)
    } else {
        Extraction::PassThrough(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(value: &str) -> Extraction<'_> {
        extract(value, DEFAULT_PREFIX, DEFAULT_SUFFIX)
    }

    #[test]
    fn empty_value_passes_through() {
        assert_eq!(ex(""), Extraction::PassThrough(""));
    }

    #[test]
    fn plain_value_passes_through_untrimmed() {
        assert_eq!(ex("  hello "), Extraction::PassThrough("  hello "));
        assert_eq!(ex("op://vault/item"), Extraction::PassThrough("op://vault/item"));
    }

    #[test]
    fn one_sided_delimiters_pass_through_untrimmed() {
        assert_eq!(ex("{{ op://a/b"), Extraction::PassThrough("{{ op://a/b"));
        assert_eq!(ex("op://a/b }}"), Extraction::PassThrough("op://a/b }}"));
        assert_eq!(ex(" {{op://a/b}}"), Extraction::PassThrough(" {{op://a/b}}"));
    }

    #[test]
    fn reference_is_stripped_and_trimmed() {
        assert_eq!(
            ex("{{ op://vault/item }}"),
            Extraction::Reference("op://vault/item")
        );
        assert_eq!(
            ex("{{op://vault/item/field}}"),
            Extraction::Reference("op://vault/item/field")
        );
        assert_eq!(
            ex("{{\t op://vault/item\n}}"),
            Extraction::Reference("op://vault/item")
        );
    }

    #[test]
    fn empty_inner_content_yields_empty_text() {
        assert_eq!(ex("{{}}"), Extraction::PassThrough(""));
        assert_eq!(ex("{{   }}"), Extraction::PassThrough(""));
    }

    #[test]
    fn delimited_without_scheme_yields_trimmed_text() {
        assert_eq!(ex("{{ .Values.name }}"), Extraction::PassThrough(".Values.name"));
        assert_eq!(ex("{{ OP://a/b }}"), Extraction::PassThrough("OP://a/b"));
    }

    #[test]
    fn only_one_delimiter_occurrence_is_stripped() {
        assert_eq!(ex("{{{{op://a/b}}}}"), Extraction::PassThrough("{{op://a/b}}"));
    }

    #[test]
    fn custom_delimiters() {
        assert_eq!(
            extract("${op://vault/item}", "${", "}"),
            Extraction::Reference("op://vault/item")
        );
        assert_eq!(
            extract("{{op://vault/item}}", "${", "}"),
            Extraction::PassThrough("{{op://vault/item}}")
        );
    }

    #[test]
    fn empty_delimiters_accept_bare_references() {
        assert_eq!(
            extract(" op://vault/item ", "", ""),
            Extraction::Reference("op://vault/item")
        );
        assert_eq!(extract(" plain ", "", ""), Extraction::PassThrough("plain"));
    }

    #[test]
    fn overlapping_delimiters_use_literal_trim() {
        // "{{}" starts with "{{" and ends with "{}"; after the prefix only "}"
        // is left, which does not end with "{}".
        assert_eq!(extract("{{}", "{{", "{}"), Extraction::PassThrough("}"));
        assert_eq!(extract("||", "||", "|"), Extraction::PassThrough(""));
    }

    #[test]
    fn extraction_helpers() {
        let r = ex("{{op://v/i/f}}");
        assert!(r.is_reference());
        assert_eq!(r.as_str(), "op://v/i/f");
        assert!(!ex("x").is_reference());
    }
}
