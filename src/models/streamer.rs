// src/models/streamer.rs

//! Streamer keyword registry.
//!
//! Owned and edited by external admin tooling; this crate only reads it.

use serde::{Deserialize, Serialize};

/// Registered mapping from a canonical streamer name to alias keywords.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamerKeywordSet {
    /// Canonical streamer name, as shown on the leaderboard.
    pub canonical_name: String,

    /// Alias keywords: nicknames, spelling variants. The canonical name
    /// itself always matches even when not listed here.
    #[serde(default)]
    pub keywords: Vec<String>,
}
