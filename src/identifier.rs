use regex::Regex;

/// Classification of a normalized identifier by length and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Granted patent number, 8 digits.
    Granted,
    /// Published application number, 11 digits.
    PublishedApplication,
    Invalid,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::Granted => "granted",
            IdentifierKind::PublishedApplication => "published_application",
            IdentifierKind::Invalid => "invalid",
        }
    }
}

pub fn classify(identifier: &str) -> IdentifierKind {
    let numeric = !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit());
    match (identifier.len(), numeric) {
        (8, true) => IdentifierKind::Granted,
        (11, true) => IdentifierKind::PublishedApplication,
        _ => IdentifierKind::Invalid,
    }
}

/// Canonicalizes a raw user-supplied or model-extracted string into a bare
/// numeric identifier: strips a trailing kind-code suffix (letter + digits,
/// e.g. "A1"/"B2"), a leading "US"/"EP" country prefix, and separator
/// characters. The output may be any length; `classify` decides validity.
pub fn normalize(raw: &str) -> String {
    let mut identifier: Vec<char> = raw.trim().chars().collect();

    if identifier.len() >= 2 && identifier[identifier.len() - 2].is_alphabetic() {
        identifier.truncate(identifier.len() - 2);
    }

    let prefixed = identifier.len() >= 2
        && matches!(
            (identifier[0], identifier[1]),
            ('U', 'S') | ('E', 'P')
        );
    if prefixed {
        identifier.drain(..2);
    }

    identifier
        .into_iter()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | ',' | '/' | '\\'))
        .collect()
}

/// Locates the first patent-number-looking token in free-form text and
/// returns it verbatim (not yet normalized). Fallback for when the
/// function-call extraction path produced nothing usable.
pub fn extract(text: &str) -> Option<String> {
    let re = Regex::new(r"(?:US|EP)\s?-?\d{4,}\s?-?(?:A\d+|B\d+)?")
        .unwrap_or_else(|_| Regex::new("^$").unwrap());
    re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_and_kind_code() {
        assert_eq!(normalize("US12345678A1"), "12345678");
        assert_eq!(normalize("EP12345678901"), "12345678901");
        assert_eq!(normalize(" US 12345678 B2 "), "12345678");
    }

    #[test]
    fn normalization_is_idempotent_on_clean_identifiers() {
        for clean in ["12345678", "12345678901"] {
            assert_eq!(normalize(clean), clean);
            assert_eq!(normalize(&normalize(clean)), normalize(clean));
        }
    }

    #[test]
    fn removes_common_separators() {
        assert_eq!(normalize("US 2023/0123456 A1"), "20230123456");
        assert_eq!(normalize("12,345,678"), "12345678");
    }

    #[test]
    fn short_inputs_do_not_panic() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("7"), "7");
        assert_eq!(normalize("A1"), "");
    }

    #[test]
    fn classifies_by_length_and_shape() {
        assert_eq!(classify("12345678"), IdentifierKind::Granted);
        assert_eq!(classify("12345678901"), IdentifierKind::PublishedApplication);
        assert_eq!(classify("1234567"), IdentifierKind::Invalid);
        assert_eq!(classify("1234567a"), IdentifierKind::Invalid);
        assert_eq!(classify(""), IdentifierKind::Invalid);
    }

    #[test]
    fn extracts_identifier_from_prose() {
        let found = extract("irrelevant text, see EP-1234567-B2 for details").expect("match");
        assert_eq!(found, "EP-1234567-B2");

        let cleaned = normalize(&found);
        assert!(!cleaned.contains("EP"));
        assert!(!cleaned.contains('B'));
        assert_eq!(cleaned, "1234567");
    }

    #[test]
    fn extract_returns_none_without_candidate() {
        assert_eq!(extract("what is the filing date?"), None);
    }

    #[test]
    fn extract_handles_spaced_forms() {
        let found = extract("the US 12345678 grant").expect("match");
        assert_eq!(normalize(&found), "12345678");
    }
}
