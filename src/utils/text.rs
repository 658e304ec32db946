// src/utils/text.rs

//! Text cleanup helpers shared by the extractor and classifier.

use unicode_segmentation::UnicodeSegmentation;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize text for fuzzy keyword comparison.
///
/// Strips every non-alphanumeric character (punctuation, whitespace, emoji)
/// and lowercases the rest, so "박진우님!" and "박진우 님" compare equal.
pub fn normalize_for_match(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Parse a donation amount from display text.
///
/// The source renders counts with thousands separators ("1,234") and
/// sometimes a trailing unit suffix. A leading minus marks a cancellation.
/// Returns `None` when no leading digits are present.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let negative = cleaned.starts_with('-');
    let digits: String = cleaned
        .chars()
        .skip(usize::from(negative))
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        return None;
    }

    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Shorten text to a grapheme-bounded preview for log lines.
pub fn preview(s: &str, max_graphemes: usize) -> String {
    let mut graphemes = s.graphemes(true);
    let head: String = graphemes.by_ref().take(max_graphemes).collect();
    if graphemes.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \t b\n c  "), "a b c");
    }

    #[test]
    fn test_normalize_for_match() {
        assert_eq!(normalize_for_match("박진우 님!"), "박진우님");
        assert_eq!(normalize_for_match("Jin-Woo PARK"), "jinwoopark");
        assert_eq!(normalize_for_match("  "), "");
    }

    #[test]
    fn test_parse_amount_plain() {
        assert_eq!(parse_amount("1000"), Some(1000));
    }

    #[test]
    fn test_parse_amount_thousands_separator() {
        assert_eq!(parse_amount("1,234"), Some(1234));
        assert_eq!(parse_amount("12,345,678"), Some(12_345_678));
    }

    #[test]
    fn test_parse_amount_negative() {
        assert_eq!(parse_amount("-1,000"), Some(-1000));
    }

    #[test]
    fn test_parse_amount_unit_suffix() {
        assert_eq!(parse_amount("1,000개"), Some(1000));
    }

    #[test]
    fn test_parse_amount_rejects_non_numeric() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("후원"), None);
        assert_eq!(parse_amount("-"), None);
    }

    #[test]
    fn test_preview_truncates_on_graphemes() {
        assert_eq!(preview("감사합니다", 3), "감사합…");
        assert_eq!(preview("short", 10), "short");
    }
}
