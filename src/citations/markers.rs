//! Delimiters of the out-of-band used-sources block.
//!
//! These strings are a byte-exact contract with the prompt template in
//! [`crate::chat::prompt`]: the model is told to wrap its citations in exactly
//! this text, and the extractor strips exactly this text. No marker is a
//! prefix of another marker in the same role set.

/// Start marker the prompt asks for.
pub const START_PRIMARY: &str = "\n<<USED_SOURCES>>\n";

/// Start marker without the leading newline, which models frequently drop.
pub const START_ALTERNATE: &str = "<<USED_SOURCES>>\n";

/// End marker closing the block.
pub const END: &str = "\n<</USED_SOURCES>>";

/// Start markers in priority order (ties resolve to the earlier entry).
pub const START_MARKERS: [&str; 2] = [START_PRIMARY, START_ALTERNATE];

/// Length in characters of the longest start marker.
pub fn max_start_len() -> usize {
    START_MARKERS
        .iter()
        .map(|m| m.chars().count())
        .max()
        .unwrap_or(0)
}

/// Length in characters of the end marker.
pub fn end_len() -> usize {
    END.chars().count()
}

/// Find the earliest start marker in `haystack`.
///
/// Returns the byte index and the marker that matched. When two markers begin
/// at the same index the primary one wins.
pub fn find_start(haystack: &str) -> Option<(usize, &'static str)> {
    let mut best: Option<(usize, &'static str)> = None;
    for marker in START_MARKERS {
        if let Some(idx) = haystack.find(marker) {
            match best {
                Some((best_idx, _)) if best_idx <= idx => {}
                _ => best = Some((idx, marker)),
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_marker_is_prefix_of_another_start() {
        for a in START_MARKERS {
            for b in START_MARKERS {
                if a != b {
                    assert!(!b.starts_with(a), "{a:?} is a prefix of {b:?}");
                }
            }
        }
    }

    #[test]
    fn markers_are_ascii() {
        assert!(START_MARKERS.iter().all(|m| m.is_ascii()));
        assert!(END.is_ascii());
    }

    #[test]
    fn find_start_prefers_lowest_index() {
        let text = format!("abc{START_PRIMARY}rest");
        // The alternate marker is found one byte later inside the primary one.
        assert_eq!(find_start(&text), Some((3, START_PRIMARY)));

        let text = format!("abc{START_ALTERNATE}rest");
        assert_eq!(find_start(&text), Some((3, START_ALTERNATE)));
    }

    #[test]
    fn find_start_none_without_marker() {
        assert_eq!(find_start("plain text <<USED"), None);
    }

    #[test]
    fn lengths() {
        assert_eq!(max_start_len(), START_PRIMARY.len());
        assert_eq!(end_len(), END.len());
    }
}
