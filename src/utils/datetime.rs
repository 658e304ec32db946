// src/utils/datetime.rs

//! Timestamp normalization utilities.
//!
//! The source dashboard renders timestamps in several forms: absolute
//! `YYYY-MM-DD HH:MM:SS`, partial `MM-DD HH:MM:SS` (year omitted), and
//! occasionally nothing at all. Everything is normalized to a single
//! absolute format before records enter the merge store.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDateTime};
use regex::Regex;

use crate::utils::text::normalize_whitespace;

fn year_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-").expect("static regex"))
}

fn partial_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})-(\d{1,2})[ T](\d{1,2}):(\d{2})(?::(\d{2}))?$").expect("static regex")
    })
}

fn embedded_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\d{4}-\d{2}-\d{2}|\d{2}-\d{2})[ T]\d{2}:\d{2}:\d{2}").expect("static regex")
    })
}

/// Normalize a raw timestamp string to `YYYY-MM-DD HH:MM:SS`.
///
/// - A string already beginning with a 4-digit year is returned unchanged.
/// - A partial `MM-DD HH:MM[:SS]` form is anchored to the year of `now`.
/// - Anything else (empty, garbage) falls back to `now` itself.
///
/// This is a total function: it never fails, whatever the input.
pub fn normalize_timestamp(raw: &str, now: NaiveDateTime) -> String {
    let trimmed = raw.trim();

    if year_prefix_re().is_match(trimmed) {
        return trimmed.to_string();
    }

    if let Some(caps) = partial_re().captures(trimmed) {
        let month: u32 = caps[1].parse().unwrap_or(1);
        let day: u32 = caps[2].parse().unwrap_or(1);
        let hour: u32 = caps[3].parse().unwrap_or(0);
        let minute = &caps[4];
        let second = caps.get(5).map_or("00", |m| m.as_str());
        return format!(
            "{:04}-{:02}-{:02} {:02}:{}:{}",
            now.year(),
            month,
            day,
            hour,
            minute,
            second
        );
    }

    now.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a normalized timestamp back into a `NaiveDateTime`.
///
/// Accepts the canonical `YYYY-MM-DD HH:MM:SS` format plus the
/// minute-precision and `T`-separated variants the source occasionally emits.
pub fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

    let trimmed = ts.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// Check whether a text cell holds a timestamp (absolute or partial form).
pub fn looks_like_timestamp(text: &str) -> bool {
    let trimmed = text.trim();
    partial_re().is_match(trimmed)
        || (year_prefix_re().is_match(trimmed) && parse_timestamp(trimmed).is_some())
}

/// Remove timestamp substrings that leak into message text.
///
/// The source page concatenates row cells, so messages sometimes carry a
/// stray `YYYY-MM-DD HH:MM:SS` or `MM-DD HH:MM:SS` fragment.
pub fn strip_embedded_timestamps(text: &str) -> String {
    let stripped = embedded_re().replace_all(text, "");
    normalize_whitespace(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 14)
            .unwrap()
            .and_hms_opt(4, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_absolute_passthrough() {
        assert_eq!(
            normalize_timestamp("2025-12-13 10:00:00", fixed_now()),
            "2025-12-13 10:00:00"
        );
        assert_eq!(
            normalize_timestamp("  2024-01-01 00:00:00  ", fixed_now()),
            "2024-01-01 00:00:00"
        );
    }

    #[test]
    fn test_partial_gets_current_year() {
        assert_eq!(
            normalize_timestamp("12-14 04:11:37", fixed_now()),
            "2025-12-14 04:11:37"
        );
    }

    #[test]
    fn test_partial_zero_padding() {
        assert_eq!(
            normalize_timestamp("2-3 4:11:37", fixed_now()),
            "2025-02-03 04:11:37"
        );
    }

    #[test]
    fn test_partial_without_seconds() {
        assert_eq!(
            normalize_timestamp("12-14 04:11", fixed_now()),
            "2025-12-14 04:11:00"
        );
    }

    #[test]
    fn test_empty_falls_back_to_now() {
        assert_eq!(normalize_timestamp("", fixed_now()), "2025-12-14 04:30:00");
    }

    #[test]
    fn test_garbage_falls_back_to_now() {
        assert_eq!(
            normalize_timestamp("방금 전", fixed_now()),
            "2025-12-14 04:30:00"
        );
        assert_eq!(
            normalize_timestamp("---", fixed_now()),
            "2025-12-14 04:30:00"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let normalized = normalize_timestamp("12-14 04:11:37", fixed_now());
        let parsed = parse_timestamp(&normalized).unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), normalized);
    }

    #[test]
    fn test_parse_minute_precision() {
        assert!(parse_timestamp("2025-12-14 04:11").is_some());
        assert!(parse_timestamp("2025-12-14T04:11:37").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_looks_like_timestamp() {
        assert!(looks_like_timestamp("12-14 04:11:37"));
        assert!(looks_like_timestamp("2025-12-14 04:11:37"));
        assert!(!looks_like_timestamp("후원자"));
        assert!(!looks_like_timestamp("1000"));
    }

    #[test]
    fn test_strip_embedded_absolute() {
        assert_eq!(
            strip_embedded_timestamps("감사합니다 2025-12-14 04:11:37"),
            "감사합니다"
        );
    }

    #[test]
    fn test_strip_embedded_partial() {
        assert_eq!(
            strip_embedded_timestamps("12-14 04:11:37 화이팅 12-14 04:11:38"),
            "화이팅"
        );
    }

    #[test]
    fn test_strip_keeps_plain_text() {
        assert_eq!(strip_embedded_timestamps("그냥 메시지"), "그냥 메시지");
    }
}
