//! Parsing of captured used-sources text into chunk identifiers.

/// Label models sometimes repeat at the top of the block.
const LABEL: &str = "USED_SOURCES";

/// Characters that decorate the label, e.g. `<<USED_SOURCES>>`, `[USED_SOURCES]:`.
const LABEL_DECORATION: &[char] = &['<', '>', '[', ']', '/', '#', ':', '*'];

/// Sentinel meaning "no sources were used".
const NONE_SENTINEL: &str = "none";

/// Parse the text captured between the used-sources markers.
///
/// Returns identifiers in the order they were declared, duplicates included.
/// Consumers should treat the result as a set for membership tests. Text that
/// is empty, `none` (any case), or otherwise yields no identifiers produces an
/// empty list; this never fails.
pub fn parse_used_sources(text: &str) -> Vec<String> {
    let body = strip_label(text.trim()).trim();
    if body.is_empty() || body.eq_ignore_ascii_case(NONE_SENTINEL) {
        return Vec::new();
    }

    body.split(['\n', ','])
        .map(clean_entry)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}

/// Remove a leading, optionally decorated, case-insensitive `USED_SOURCES` label.
fn strip_label(text: &str) -> &str {
    let undecorated =
        text.trim_start_matches(|c: char| LABEL_DECORATION.contains(&c) || c.is_whitespace());
    match undecorated.get(..LABEL.len()) {
        Some(head) if head.eq_ignore_ascii_case(LABEL) => undecorated[LABEL.len()..]
            .trim_start_matches(|c: char| LABEL_DECORATION.contains(&c) || c.is_whitespace()),
        _ => text,
    }
}

/// Trim one entry and drop a markdown bullet.
fn clean_entry(entry: &str) -> &str {
    let entry = entry.trim();
    entry
        .strip_prefix("- ")
        .or_else(|| entry.strip_prefix("* "))
        .map(str::trim)
        .unwrap_or(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_sentinel_any_case() {
        assert!(parse_used_sources("none").is_empty());
        assert!(parse_used_sources("  NONE \n").is_empty());
        assert!(parse_used_sources("None").is_empty());
    }

    #[test]
    fn empty_text() {
        assert!(parse_used_sources("").is_empty());
        assert!(parse_used_sources(" \n\t ").is_empty());
    }

    #[test]
    fn mixed_delimiters() {
        assert_eq!(
            parse_used_sources("id-1, id-2\nid-3"),
            vec!["id-1", "id-2", "id-3"]
        );
    }

    #[test]
    fn order_and_duplicates_preserved() {
        assert_eq!(parse_used_sources("b\na\nb"), vec!["b", "a", "b"]);
    }

    #[test]
    fn empty_pieces_dropped() {
        assert_eq!(parse_used_sources("a,,\n\n , b,"), vec!["a", "b"]);
    }

    #[test]
    fn label_prefix_stripped() {
        assert_eq!(parse_used_sources("USED_SOURCES:\nid-1\nid-2"), vec!["id-1", "id-2"]);
        assert_eq!(parse_used_sources("[used_sources] id-1"), vec!["id-1"]);
        assert_eq!(parse_used_sources("<<USED_SOURCES>>\nid-1"), vec!["id-1"]);
        assert!(parse_used_sources("Used_Sources: none").is_empty());
    }

    #[test]
    fn label_like_identifier_is_kept() {
        // Only a leading label is stripped.
        assert_eq!(parse_used_sources("id-1\nUSED_SOURCES"), vec!["id-1", "USED_SOURCES"]);
    }

    #[test]
    fn bullets_are_removed() {
        assert_eq!(parse_used_sources("- id-1\n* id-2"), vec!["id-1", "id-2"]);
    }

    #[test]
    fn non_ascii_text_does_not_panic() {
        assert_eq!(parse_used_sources("é"), vec!["é"]);
        assert_eq!(parse_used_sources("ü-1, ß-2"), vec!["ü-1", "ß-2"]);
    }
}
