// src/pipeline/merge.rs

//! Record deduplication and merge.
//!
//! The source re-renders donation rows with nondeterministic internal ids,
//! so the same underlying event can arrive twice with different keys. Two
//! layers of dedup run on every merge:
//!
//! 1. **Exact-key**: records sharing an identity key collapse to one.
//! 2. **Fuzzy**: records identical in (donor, amount, message) whose
//!    timestamps fall within a configured window collapse to one.
//!
//! When two records collapse, precedence is fixed (not heuristic):
//! a record carrying a non-empty target name wins, then the record with the
//! longer identity key, then the record already in the store.
//!
//! Merging is idempotent: re-applying a batch changes nothing.

use std::collections::HashMap;

use chrono::Duration;

use crate::models::DonationRecord;
use crate::utils::datetime::parse_timestamp;

/// Result of merging a batch into the store.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// The merged record set, sorted latest-first.
    pub records: Vec<DonationRecord>,
    /// Distinct new records accepted from the batch.
    pub added: usize,
    /// Batch records collapsed by identity key.
    pub exact_collapsed: usize,
    /// Batch records collapsed by the fuzzy time window.
    pub fuzzy_collapsed: usize,
}

/// Merge a batch of freshly extracted records into the existing store.
///
/// The existing set is folded through the same dedup first, so a store
/// written under a different window setting still converges.
pub fn merge_records(
    existing: &[DonationRecord],
    incoming: &[DonationRecord],
    window: Duration,
) -> MergeOutcome {
    let mut set = MergeSet::new(window);

    for record in existing {
        let mut record = record.clone();
        record.ensure_identity_key();
        set.insert(record);
    }

    let mut outcome = MergeOutcome::default();
    for record in incoming {
        let mut record = record.clone();
        record.ensure_identity_key();
        match set.insert(record) {
            Inserted::Added => outcome.added += 1,
            Inserted::ExactCollapsed => outcome.exact_collapsed += 1,
            Inserted::FuzzyCollapsed => outcome.fuzzy_collapsed += 1,
        }
    }

    outcome.records = set.into_records();
    sort_store(&mut outcome.records);
    outcome
}

/// Sort the store latest-first, identity key as the deterministic tie-break.
///
/// Normalized timestamps compare correctly as strings.
pub fn sort_store(records: &mut [DonationRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

enum Inserted {
    Added,
    ExactCollapsed,
    FuzzyCollapsed,
}

type FuzzyKey = (String, i64, String);

fn fuzzy_key(record: &DonationRecord) -> FuzzyKey {
    (
        record.donor_name.clone(),
        record.amount,
        record.message.clone(),
    )
}

/// Decide whether `candidate` should replace the record already kept.
fn replaces(current: &DonationRecord, candidate: &DonationRecord) -> bool {
    if candidate.is_classified() != current.is_classified() {
        return candidate.is_classified();
    }
    candidate.id.len() > current.id.len()
}

struct MergeSet {
    window: Duration,
    records: Vec<DonationRecord>,
    by_key: HashMap<String, usize>,
    by_fuzzy: HashMap<FuzzyKey, Vec<usize>>,
}

impl MergeSet {
    fn new(window: Duration) -> Self {
        Self {
            window,
            records: Vec::new(),
            by_key: HashMap::new(),
            by_fuzzy: HashMap::new(),
        }
    }

    fn insert(&mut self, record: DonationRecord) -> Inserted {
        if let Some(&idx) = self.by_key.get(&record.id) {
            if replaces(&self.records[idx], &record) {
                self.replace(idx, record);
            }
            return Inserted::ExactCollapsed;
        }

        if let Some(idx) = self.find_fuzzy_match(&record) {
            if replaces(&self.records[idx], &record) {
                self.replace(idx, record);
            }
            return Inserted::FuzzyCollapsed;
        }

        let idx = self.records.len();
        self.by_key.insert(record.id.clone(), idx);
        self.by_fuzzy.entry(fuzzy_key(&record)).or_default().push(idx);
        self.records.push(record);
        Inserted::Added
    }

    fn find_fuzzy_match(&self, record: &DonationRecord) -> Option<usize> {
        let candidate_ts = parse_timestamp(&record.timestamp)?;
        let indices = self.by_fuzzy.get(&fuzzy_key(record))?;

        indices.iter().copied().find(|&idx| {
            parse_timestamp(&self.records[idx].timestamp)
                .map(|kept_ts| kept_ts.signed_duration_since(candidate_ts).abs() < self.window)
                .unwrap_or(false)
        })
    }

    fn replace(&mut self, idx: usize, record: DonationRecord) {
        let old_key = self.records[idx].id.clone();
        let old_fuzzy = fuzzy_key(&self.records[idx]);
        let new_fuzzy = fuzzy_key(&record);

        if old_key != record.id {
            self.by_key.remove(&old_key);
            self.by_key.insert(record.id.clone(), idx);
        }
        if old_fuzzy != new_fuzzy {
            if let Some(bucket) = self.by_fuzzy.get_mut(&old_fuzzy) {
                bucket.retain(|&i| i != idx);
            }
            self.by_fuzzy.entry(new_fuzzy).or_default().push(idx);
        }

        self.records[idx] = record;
    }

    fn into_records(self) -> Vec<DonationRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::derive_identity_key;

    fn window() -> Duration {
        Duration::seconds(60)
    }

    fn make_record(
        id: &str,
        timestamp: &str,
        donor: &str,
        amount: i64,
        target: &str,
        message: &str,
    ) -> DonationRecord {
        DonationRecord {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            donor_name: donor.to_string(),
            amount,
            target_name: target.to_string(),
            message: message.to_string(),
            cancelled: false,
        }
    }

    #[test]
    fn test_merge_into_empty_store() {
        let batch = vec![
            make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", ""),
            make_record("b", "2025-12-13 10:05:00", "u2", 500, "", ""),
        ];
        let outcome = merge_records(&[], &batch, window());
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.added, 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![
            make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", ""),
            make_record("c", "2025-12-13 11:00:00", "u3", 300, "박진우", "화이팅"),
        ];

        let once = merge_records(&existing, &batch, window());
        let twice = merge_records(&once.records, &batch, window());

        assert_eq!(once.records, twice.records);
        assert_eq!(twice.added, 0);
    }

    #[test]
    fn test_exact_key_collapses_to_one() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];

        let outcome = merge_records(&existing, &batch, window());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.exact_collapsed, 1);
        assert_eq!(outcome.added, 0);
    }

    #[test]
    fn test_exact_key_prefers_classified_record() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "박진우", "")];

        let outcome = merge_records(&existing, &batch, window());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].target_name, "박진우");

        // And classification is never lost to an unclassified duplicate.
        let reversed = merge_records(
            &outcome.records,
            &[make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")],
            window(),
        );
        assert_eq!(reversed.records[0].target_name, "박진우");
    }

    #[test]
    fn test_fuzzy_window_collapses_near_duplicates() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![make_record("zz", "2025-12-13 10:00:05", "u1", 1000, "", "")];

        let outcome = merge_records(&existing, &batch, window());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.fuzzy_collapsed, 1);
    }

    #[test]
    fn test_fuzzy_prefers_longer_identity_key() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![make_record("longer-key", "2025-12-13 10:00:05", "u1", 1000, "", "")];

        let outcome = merge_records(&existing, &batch, window());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].id, "longer-key");
    }

    #[test]
    fn test_outside_window_is_distinct() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![make_record("b", "2025-12-13 10:02:00", "u1", 1000, "", "")];

        let outcome = merge_records(&existing, &batch, window());
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn test_different_message_is_distinct() {
        let existing = vec![make_record("a", "2025-12-13 10:00:00", "u1", 1000, "", "축하")];
        let batch = vec![make_record("b", "2025-12-13 10:00:05", "u1", 1000, "", "")];

        let outcome = merge_records(&existing, &batch, window());
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_sort_is_timestamp_descending() {
        let batch = vec![
            make_record("a", "2025-12-13 09:00:00", "u1", 100, "", ""),
            make_record("b", "2025-12-13 11:00:00", "u2", 200, "", ""),
            make_record("c", "2025-12-13 10:00:00", "u3", 300, "", ""),
        ];
        let outcome = merge_records(&[], &batch, window());
        let times: Vec<&str> = outcome
            .records
            .iter()
            .map(|r| r.timestamp.as_str())
            .collect();
        assert_eq!(
            times,
            vec![
                "2025-12-13 11:00:00",
                "2025-12-13 10:00:00",
                "2025-12-13 09:00:00"
            ]
        );
    }

    #[test]
    fn test_missing_id_is_derived_before_merge() {
        let record = make_record("", "2025-12-13 10:00:00", "u1", 1000, "", "");
        let outcome = merge_records(&[], &[record], window());
        assert_eq!(
            outcome.records[0].id,
            derive_identity_key("2025-12-13 10:00:00", "u1", 1000)
        );
    }

    /// The end-to-end merge scenario: one fuzzy pair collapses, the second
    /// batch record is new, and the result is sorted latest-first.
    #[test]
    fn test_merge_scenario() {
        let existing = vec![make_record("A", "2025-12-13 10:00:00", "u1", 1000, "", "")];
        let batch = vec![
            make_record("", "2025-12-13 10:00:05", "u1", 1000, "", ""),
            make_record("", "2025-12-13 10:05:00", "u2", 500, "", ""),
        ];

        let outcome = merge_records(&existing, &batch, window());

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.fuzzy_collapsed, 1);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.records[0].donor_name, "u2");
        assert_eq!(outcome.records[1].donor_name, "u1");
    }
}
