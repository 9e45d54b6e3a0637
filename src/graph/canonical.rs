//! Identity rules for entity names, type labels and relationship labels.

/// Canonical key for an entity name: trimmed, internal whitespace collapsed
/// to single spaces, case-folded.
pub fn canonicalize(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

/// Surface form with whitespace tidied but case preserved
pub fn tidy(name: &str) -> String {
    collapse_whitespace(name)
}

/// Relationship labels are stored as UPPER_SNAKE_CASE: `works on` and
/// `Works-On` both become `WORKS_ON`.
pub fn canonical_label(label: &str) -> String {
    label
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
