// src/services/extractor.rs

//! Donation record extraction.
//!
//! Two input channels feed this module: JSON payloads captured from the
//! dashboard's network traffic, and rows scraped from the rendered DOM.
//! Payload shapes are handled by named adapters selected by a key
//! discriminator; a case-insensitive key-sniffing search remains as the
//! last-resort adapter for shapes the source has not shown us yet.
//!
//! Extraction is a pure transform. A malformed item yields nothing; it
//! never aborts the rest of the batch.

use chrono::NaiveDateTime;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

use crate::models::{DomSelectors, DonationRecord, UNCLASSIFIED};
use crate::utils::datetime::{looks_like_timestamp, normalize_timestamp, strip_embedded_timestamps};
use crate::utils::text::{normalize_whitespace, parse_amount};

/// Recursion guard for payload walking.
const MAX_DEPTH: usize = 8;

/// Field values pulled from one source item, before normalization.
#[derive(Debug, Default)]
struct RawRecord {
    source_id: Option<String>,
    timestamp: String,
    donor: String,
    amount: i64,
    target: String,
    message: String,
    cancelled: bool,
}

impl RawRecord {
    /// Normalize into a store-ready record.
    fn finalize(mut self, game_amounts: &[i64], now: NaiveDateTime) -> DonationRecord {
        if self.amount < 0 {
            self.cancelled = true;
            self.amount = -self.amount;
        }

        // Mini-game payouts are a side activity, never credited to a streamer.
        let target = if game_amounts.contains(&self.amount) {
            UNCLASSIFIED.to_string()
        } else {
            normalize_whitespace(&self.target)
        };

        let mut record = DonationRecord {
            id: self.source_id.unwrap_or_default(),
            timestamp: normalize_timestamp(&self.timestamp, now),
            donor_name: normalize_whitespace(&self.donor),
            amount: self.amount,
            target_name: target,
            message: strip_embedded_timestamps(&self.message),
            cancelled: self.cancelled,
        };
        record.ensure_identity_key();
        record
    }
}

/// Extract every donation record reachable inside a captured JSON payload.
///
/// Arrays and nested containers are walked; each object is offered to the
/// adapters once and not descended into further when one accepts it.
pub fn extract_payload(
    payload: &Value,
    game_amounts: &[i64],
    now: NaiveDateTime,
) -> Vec<DonationRecord> {
    let mut records = Vec::new();
    walk_payload(payload, game_amounts, now, &mut records, 0);
    records
}

fn walk_payload(
    value: &Value,
    game_amounts: &[i64],
    now: NaiveDateTime,
    records: &mut Vec<DonationRecord>,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                walk_payload(item, game_amounts, now, records, depth + 1);
            }
        }
        Value::Object(object) => {
            if let Some(raw) = adapt_object(object) {
                records.push(raw.finalize(game_amounts, now));
            } else {
                for nested in object.values() {
                    walk_payload(nested, game_amounts, now, records, depth + 1);
                }
            }
        }
        _ => {}
    }
}

/// Offer one JSON object to the adapters, most specific first.
fn adapt_object(object: &Map<String, Value>) -> Option<RawRecord> {
    adapt_balloon_history(object)
        .or_else(|| adapt_ranking_feed(object))
        .or_else(|| adapt_by_key_sniffing(object))
}

/// Adapter for the balloon-history shape:
/// `{ regDate, userNick, starCount, bjNick, msg, ... }`.
fn adapt_balloon_history(object: &Map<String, Value>) -> Option<RawRecord> {
    // Discriminator: a reg date plus a star count.
    let timestamp = get_string(object, &["regDate", "reg_date"])?;
    let amount = get_amount(object, &["starCount", "star_count", "starBalloon"])?;
    let donor = get_string(object, &["userNick", "user_nick", "userId", "user_id"])?;

    Some(RawRecord {
        source_id: get_id(object),
        timestamp,
        donor,
        amount,
        target: get_string(object, &["bjNick", "bj_nick", "bjId", "bj_id"]).unwrap_or_default(),
        message: get_string(object, &["msg", "message"]).unwrap_or_default(),
        cancelled: get_flag(object, &["isCancel", "is_cancel", "cancelFlag"]),
    })
}

/// Adapter for the ranking-feed shape:
/// `{ date, nickname, count, to, message, cancel, ... }`.
fn adapt_ranking_feed(object: &Map<String, Value>) -> Option<RawRecord> {
    // Discriminator: a date, a count, and an explicit recipient field.
    let timestamp = get_string(object, &["date", "datetime"])?;
    let amount = get_amount(object, &["count", "cnt"])?;
    let target = get_string(object, &["to", "bj", "recipient"])?;
    let donor = get_string(object, &["nickname", "nick", "user", "name"])?;

    Some(RawRecord {
        source_id: get_id(object),
        timestamp,
        donor,
        amount,
        target,
        message: get_string(object, &["message", "text", "memo"]).unwrap_or_default(),
        cancelled: get_flag(object, &["cancel", "cancelled", "canceled"]),
    })
}

/// Last-resort adapter: case-insensitive token search across keys.
///
/// A record is produced only when both a user-identifying field and an
/// amount field are found; anything less is not guessed at.
fn adapt_by_key_sniffing(object: &Map<String, Value>) -> Option<RawRecord> {
    let mut date_key: Option<&str> = None;
    let mut target_key: Option<&str> = None;
    let mut amount_key: Option<&str> = None;
    let mut message_key: Option<&str> = None;
    let mut user_key: Option<&str> = None;
    let mut cancel_key: Option<&str> = None;

    for key in object.keys() {
        let lower = key.to_lowercase();
        // Target tokens are tested before user tokens so "bjName" binds as
        // a target, not a user.
        if date_key.is_none() && contains_any(&lower, &["date", "time", "reg"]) {
            date_key = Some(key);
        } else if target_key.is_none()
            && (contains_any(&lower, &["bj", "target", "recipient", "receiver"]) || lower == "to")
        {
            target_key = Some(key);
        } else if amount_key.is_none()
            && contains_any(&lower, &["amount", "count", "star", "cnt", "coin", "balloon"])
        {
            amount_key = Some(key);
        } else if message_key.is_none()
            && contains_any(&lower, &["msg", "message", "content", "text", "comment"])
        {
            message_key = Some(key);
        } else if user_key.is_none() && contains_any(&lower, &["user", "nick", "name", "donor"]) {
            user_key = Some(key);
        } else if cancel_key.is_none() && lower.contains("cancel") {
            cancel_key = Some(key);
        }
    }

    let donor = value_to_string(object.get(user_key?)?)?;
    let amount = amount_from_value(object.get(amount_key?)?)?;

    let field = |key: Option<&str>| {
        key.and_then(|k| object.get(k))
            .and_then(value_to_string)
            .unwrap_or_default()
    };

    Some(RawRecord {
        source_id: get_id(object),
        timestamp: field(date_key),
        donor,
        amount,
        target: field(target_key),
        message: field(message_key),
        cancelled: cancel_key
            .and_then(|k| object.get(k))
            .map(flag_from_value)
            .unwrap_or(false),
    })
}

fn contains_any(haystack: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| haystack.contains(t))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn amount_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn flag_from_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "y" | "1"),
        _ => false,
    }
}

fn get_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(value_to_string))
        .filter(|s| !s.trim().is_empty())
}

fn get_amount(object: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(amount_from_value))
}

fn get_flag(object: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .map(flag_from_value)
        .next()
        .unwrap_or(false)
}

fn get_id(object: &Map<String, Value>) -> Option<String> {
    get_string(object, &["id", "no", "seq", "historyNo", "history_no"])
}

/// Extract donation records from the rendered page.
pub fn extract_dom(
    html: &str,
    selectors: &DomSelectors,
    game_amounts: &[i64],
    now: NaiveDateTime,
) -> Vec<DonationRecord> {
    let (row_selector, cell_selector) = match (
        Selector::parse(&selectors.row_selector),
        Selector::parse(&selectors.cell_selector),
    ) {
        (Ok(row), Ok(cell)) => (row, cell),
        _ => {
            log::warn!("Invalid DOM selectors, skipping the DOM channel");
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
            .collect();

        if let Some(record) = extract_row(&cells, selectors, game_amounts, now) {
            records.push(record);
        }
    }

    records
}

/// Read the fixed logical columns out of one row's cell texts.
///
/// A row counts only when the date cell actually looks like a timestamp and
/// the amount cell parses; everything else on the page (headers, notices,
/// spacer rows) drops out here.
fn extract_row(
    cells: &[String],
    selectors: &DomSelectors,
    game_amounts: &[i64],
    now: NaiveDateTime,
) -> Option<DonationRecord> {
    let date = cells.get(selectors.date_col)?;
    let donor = cells.get(selectors.user_col)?;
    let amount_text = cells.get(selectors.amount_col)?;

    if date.is_empty() || !looks_like_timestamp(date) {
        return None;
    }
    if donor.is_empty() {
        return None;
    }
    let amount = parse_amount(amount_text)?;

    let column = |col: Option<usize>| {
        col.and_then(|i| cells.get(i))
            .cloned()
            .unwrap_or_default()
    };

    Some(
        RawRecord {
            source_id: None,
            timestamp: date.clone(),
            donor: donor.clone(),
            amount,
            target: column(selectors.target_col),
            message: column(selectors.message_col),
            cancelled: false,
        }
        .finalize(game_amounts, now),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 14)
            .unwrap()
            .and_hms_opt(4, 30, 0)
            .unwrap()
    }

    fn extract(payload: &Value) -> Vec<DonationRecord> {
        extract_payload(payload, &[], fixed_now())
    }

    #[test]
    fn test_balloon_history_shape() {
        let payload = json!({
            "list": [{
                "historyNo": "48213",
                "regDate": "12-13 22:10:05",
                "userNick": "열혈팬",
                "starCount": "1,000",
                "bjNick": "박진우",
                "msg": "오늘 방송 최고"
            }]
        });

        let records = extract(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "48213");
        assert_eq!(records[0].timestamp, "2025-12-13 22:10:05");
        assert_eq!(records[0].donor_name, "열혈팬");
        assert_eq!(records[0].amount, 1000);
        assert_eq!(records[0].target_name, "박진우");
    }

    #[test]
    fn test_ranking_feed_shape() {
        let payload = json!([{
            "date": "2025-12-13 22:11:00",
            "nickname": "팬클럽장",
            "count": 500,
            "to": "김철수",
            "message": "축하드려요",
            "cancel": false
        }]);

        let records = extract(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_name, "김철수");
        assert_eq!(records[0].amount, 500);
        assert!(!records[0].cancelled);
    }

    #[test]
    fn test_key_sniffing_fallback() {
        let payload = json!({
            "rows": [{
                "eventTime": "12-13 22:12:00",
                "fanNick": "응원단",
                "coinAmount": "2,500",
                "comment": "화이팅"
            }]
        });

        let records = extract(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].donor_name, "응원단");
        assert_eq!(records[0].amount, 2500);
        assert_eq!(records[0].message, "화이팅");
    }

    #[test]
    fn test_sniffing_binds_bj_key_as_target() {
        let payload = json!({
            "regTime": "12-13 22:13:00",
            "bjName": "박진우",
            "userName": "팬1",
            "starCnt": 100
        });

        let records = extract(&payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_name, "박진우");
        assert_eq!(records[0].donor_name, "팬1");
    }

    #[test]
    fn test_no_record_without_user_field() {
        let payload = json!({
            "regDate": "12-13 22:10:05",
            "starCount": 1000
        });
        assert!(extract(&payload).is_empty());
    }

    #[test]
    fn test_no_record_without_amount_field() {
        let payload = json!({
            "regDate": "12-13 22:10:05",
            "userNick": "팬1"
        });
        assert!(extract(&payload).is_empty());
    }

    #[test]
    fn test_bad_item_does_not_abort_batch() {
        let payload = json!([
            { "garbage": true },
            {
                "date": "2025-12-13 22:11:00",
                "nickname": "팬1",
                "count": 500,
                "to": "김철수"
            }
        ]);

        let records = extract(&payload);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_negative_amount_marks_cancelled() {
        let payload = json!({
            "date": "2025-12-13 22:11:00",
            "nickname": "팬1",
            "count": -500,
            "to": "김철수"
        });

        let records = extract(&payload);
        assert_eq!(records.len(), 1);
        assert!(records[0].cancelled);
        assert_eq!(records[0].amount, 500);
    }

    #[test]
    fn test_game_amount_forced_unclassified() {
        let payload = json!({
            "date": "2025-12-13 22:11:00",
            "nickname": "팬1",
            "count": 777,
            "to": "김철수"
        });

        let records = extract_payload(&payload, &[777], fixed_now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_name, UNCLASSIFIED);
    }

    #[test]
    fn test_message_timestamp_fragment_stripped() {
        let payload = json!({
            "regDate": "12-13 22:10:05",
            "userNick": "팬1",
            "starCount": 100,
            "msg": "감사합니다 12-13 22:10:05"
        });

        let records = extract(&payload);
        assert_eq!(records[0].message, "감사합니다");
    }

    #[test]
    fn test_extract_dom_rows() {
        let html = r#"
            <table class="monitor"><tbody>
                <tr><td>12-13 22:10:05</td><td>팬1</td><td>1,000</td><td>감사</td><td>박진우</td></tr>
                <tr><td>날짜</td><td>닉네임</td><td>개수</td><td>메시지</td><td>BJ</td></tr>
                <tr><td>12-13 22:11:00</td><td>팬2</td><td>500</td><td></td><td></td></tr>
            </tbody></table>
        "#;

        let records = extract_dom(html, &DomSelectors::default(), &[], fixed_now());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].donor_name, "팬1");
        assert_eq!(records[0].amount, 1000);
        assert_eq!(records[0].target_name, "박진우");
        assert_eq!(records[1].donor_name, "팬2");
    }

    #[test]
    fn test_dom_row_requires_date_and_amount() {
        let html = r#"
            <table class="monitor"><tbody>
                <tr><td></td><td>팬1</td><td>1,000</td></tr>
                <tr><td>12-13 22:10:05</td><td>팬1</td><td>별풍선</td></tr>
            </tbody></table>
        "#;

        let records = extract_dom(html, &DomSelectors::default(), &[], fixed_now());
        assert!(records.is_empty());
    }

    #[test]
    fn test_derived_ids_differ_for_distinct_rows() {
        let payload = json!([
            { "date": "2025-12-13 22:11:00", "nickname": "팬1", "count": 500, "to": "김철수" },
            { "date": "2025-12-13 22:12:00", "nickname": "팬1", "count": 500, "to": "김철수" }
        ]);

        let records = extract(&payload);
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
    }
}
