//! Artist-name normalization for catalog lookups.
//!
//! Chart data credits collaborations inline ("Drake Featuring Rihanna").
//! The catalog search works best on the lead artist alone, so everything
//! from the first collaboration marker onward is dropped before querying.

use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Collaboration markers, matched as whole tokens.
/// A single alternation so the leftmost marker in the string wins,
/// regardless of which marker it is.
pub static COLLABORATION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)(?:featuring|feat\.|ft\.|with)(?:\s|$)").unwrap()
});

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Strip collaboration qualifiers from a charted artist credit.
///
/// Returns the text before the first marker, trimmed. If there is no marker,
/// or the marker leads the string (a band literally named "With ..."),
/// the trimmed input is returned unchanged. Case and inner spacing are preserved.
pub fn normalize_artist_name(artist_name: &str) -> String {
    let trimmed = artist_name.trim();
    let lead = match COLLABORATION_MARKER.find(trimmed) {
        Some(m) => trimmed[..m.start()].trim(),
        None => trimmed,
    };
    let name = if lead.is_empty() { trimmed } else { lead };
    name.to_string()
}

/// Build the catalog search query for a (title, artist) pair.
/// Double quotes inside the fields are dropped so the field filters stay balanced.
pub fn search_query(track_name: &str, artist_name: &str) -> String {
    let clean = |s: &str| s.replace('"', "").trim().to_string();
    format!(
        "track:\"{}\" artist:\"{}\"",
        clean(track_name),
        clean(artist_name)
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_featuring() {
        assert_eq!(normalize_artist_name("Drake Featuring Rihanna"), "Drake");
        assert_eq!(normalize_artist_name("Drake featuring Rihanna"), "Drake");
        assert_eq!(normalize_artist_name("Drake feat. Rihanna"), "Drake");
        assert_eq!(normalize_artist_name("Drake Ft. Rihanna"), "Drake");
    }

    #[test]
    fn test_normalize_with() {
        assert_eq!(normalize_artist_name("Drake with Future"), "Drake");
        assert_eq!(normalize_artist_name("Drake WITH Future"), "Drake");
    }

    #[test]
    fn test_normalize_no_marker() {
        assert_eq!(normalize_artist_name("Drake"), "Drake");
        assert_eq!(normalize_artist_name("  Drake  "), "Drake");
        assert_eq!(normalize_artist_name(""), "");
    }

    #[test]
    fn test_marker_must_be_a_token() {
        // "with" inside a word is not a marker
        assert_eq!(normalize_artist_name("Bill Withers"), "Bill Withers");
        assert_eq!(normalize_artist_name("Featurette"), "Featurette");
    }

    #[test]
    fn test_leftmost_marker_wins() {
        assert_eq!(normalize_artist_name("A with B Featuring C"), "A");
        assert_eq!(normalize_artist_name("A Featuring B with C"), "A");
    }

    #[test]
    fn test_leading_marker_keeps_name() {
        assert_eq!(normalize_artist_name("With Confidence"), "With Confidence");
    }

    #[test]
    fn test_non_ascii_prefix() {
        assert_eq!(normalize_artist_name("Beyoncé Featuring JAY Z"), "Beyoncé");
        assert_eq!(normalize_artist_name("Björk  Guðmundsdóttir"), "Björk  Guðmundsdóttir");
    }

    #[test]
    fn test_no_marker_returns_trimmed_input_unchanged() {
        assert_eq!(normalize_artist_name(" Earth,  Wind & Fire "), "Earth,  Wind & Fire");
        assert_eq!(normalize_artist_name("Drake  Featuring Rihanna"), "Drake");
    }

    #[test]
    fn test_search_query() {
        assert_eq!(
            search_query("God's Plan", "Drake"),
            "track:\"God's Plan\" artist:\"Drake\""
        );
        assert_eq!(
            search_query("Say \"Hi\"", " X "),
            "track:\"Say Hi\" artist:\"X\""
        );
    }
}
