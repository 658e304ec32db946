// src/models/donation.rs

//! Donation record data structure.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel for a record that could not be attributed to any streamer.
pub const UNCLASSIFIED: &str = "";

/// One observed donation event, as persisted in the leaderboard store.
///
/// Wire format is camelCase JSON; the identity key is serialized as
/// `identityKey` for the front-end contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    /// Identity key: the source row id when one is present, otherwise
    /// derived from (timestamp, donor, amount). Not unique across scrape
    /// passes; see the fuzzy dedup in the merge step.
    #[serde(rename = "identityKey", default)]
    pub id: String,

    /// Absolute timestamp, normalized to `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,

    /// Donor display name.
    pub donor_name: String,

    /// Donated unit count.
    pub amount: i64,

    /// Credited streamer; empty while unclassified.
    #[serde(default)]
    pub target_name: String,

    /// Free-text donor message, embedded timestamps stripped.
    #[serde(default)]
    pub message: String,

    /// Set when the source reported the donation as cancelled/decremented.
    #[serde(default)]
    pub cancelled: bool,
}

impl DonationRecord {
    /// Whether this record has been attributed to a streamer.
    pub fn is_classified(&self) -> bool {
        !self.target_name.is_empty()
    }

    /// Fill in a derived identity key if the source supplied none.
    pub fn ensure_identity_key(&mut self) {
        if self.id.is_empty() {
            self.id = derive_identity_key(&self.timestamp, &self.donor_name, self.amount);
        }
    }
}

/// Derive an identity key from the record triple.
///
/// The source re-renders rows with nondeterministic internal ids, so when no
/// usable id is present the key is a truncated SHA-256 over the fields that
/// identify the event itself.
pub fn derive_identity_key(timestamp: &str, donor_name: &str, amount: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(b"|");
    hasher.update(donor_name.as_bytes());
    hasher.update(b"|");
    hasher.update(amount.to_le_bytes());
    hex::encode(&hasher.finalize()[..8])
}
