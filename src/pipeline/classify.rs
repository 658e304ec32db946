// src/pipeline/classify.rs

//! Donation-to-streamer classification.
//!
//! A record is attributed to a streamer when exactly one registered keyword
//! set matches its target-name field or message. A multi-streamer match is
//! surfaced and left unclassified — never silently resolved to the first
//! match.

use crate::models::{DonationRecord, StreamerKeywordSet};
use crate::utils::text::{normalize_for_match, preview};

/// Outcome of matching one text against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Exactly one streamer matched.
    Matched(String),
    /// Two or more streamers matched; candidates listed for the log.
    Ambiguous(Vec<String>),
    /// No streamer matched.
    Unmatched,
}

struct Entry {
    canonical: String,
    /// Normalized needles: the canonical name plus every alias keyword.
    needles: Vec<String>,
}

/// Keyword matcher built from the registered streamer sets.
pub struct Classifier {
    entries: Vec<Entry>,
}

impl Classifier {
    /// Build a classifier from the registry.
    ///
    /// Keywords normalize the same way input text does; keywords that
    /// normalize to nothing are dropped (an empty needle matches anything).
    pub fn new(sets: &[StreamerKeywordSet]) -> Self {
        let entries = sets
            .iter()
            .filter_map(|set| {
                let needles: Vec<String> = std::iter::once(set.canonical_name.as_str())
                    .chain(set.keywords.iter().map(String::as_str))
                    .map(normalize_for_match)
                    .filter(|needle| !needle.is_empty())
                    .collect();

                if needles.is_empty() {
                    log::warn!(
                        "Streamer '{}' has no usable keywords, skipping",
                        set.canonical_name
                    );
                    return None;
                }
                Some(Entry {
                    canonical: set.canonical_name.clone(),
                    needles,
                })
            })
            .collect();

        Self { entries }
    }

    /// Number of registered streamers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a name is one of the registered canonical names.
    pub fn is_canonical(&self, name: &str) -> bool {
        !name.is_empty() && self.entries.iter().any(|e| e.canonical == name)
    }

    /// Match one text against every registered keyword set.
    pub fn classify(&self, text: &str) -> Classification {
        let haystack = normalize_for_match(text);
        if haystack.is_empty() {
            return Classification::Unmatched;
        }

        let matched: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|entry| entry.needles.iter().any(|n| haystack.contains(n.as_str())))
            .collect();

        match matched.as_slice() {
            [] => Classification::Unmatched,
            [single] => Classification::Matched(single.canonical.clone()),
            many => Classification::Ambiguous(many.iter().map(|e| e.canonical.clone()).collect()),
        }
    }

    /// Resolve a record's attribution: target-name field first, then the
    /// free-text message. Ambiguity stops resolution immediately.
    pub fn resolve(&self, target_name: &str, message: &str) -> Option<String> {
        for text in [target_name, message] {
            if text.trim().is_empty() {
                continue;
            }
            match self.classify(text) {
                Classification::Matched(name) => return Some(name),
                Classification::Ambiguous(candidates) => {
                    log::warn!(
                        "Ambiguous classification for \"{}\" (candidates: {}), leaving unclassified",
                        preview(text, 24),
                        candidates.join(", ")
                    );
                    return None;
                }
                Classification::Unmatched => {}
            }
        }
        None
    }
}

/// Batch re-pass over persisted records.
///
/// Re-attributes records that do not yet carry a canonical name, using the
/// message text as well. Safe to run repeatedly as keyword sets evolve.
/// Game-payout records are never touched.
pub fn reclassify(
    records: &mut [DonationRecord],
    classifier: &Classifier,
    game_amounts: &[i64],
) -> usize {
    let mut changed = 0;

    for record in records.iter_mut() {
        if game_amounts.contains(&record.amount) {
            continue;
        }
        if classifier.is_canonical(&record.target_name) {
            continue;
        }
        if let Some(name) = classifier.resolve(&record.target_name, &record.message) {
            if record.target_name != name {
                log::debug!(
                    "Reclassified donation {} ({} -> {})",
                    record.id,
                    preview(&record.target_name, 16),
                    name
                );
                record.target_name = name;
                changed += 1;
            }
        }
    }

    changed
}
