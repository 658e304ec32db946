//! Storage abstractions for the donation record store.
//!
//! The store is a single JSON document, rewritten in full on every
//! successful poll cycle. The web front-end reads this document directly:
//!
//! ```text
//! {
//!   "success": true,
//!   "data": [ DonationRecord, ... ],   // strict timestamp-descending
//!   "lastUpdate": "2025-12-14T04:11:37Z",
//!   "source": "live-monitor"
//! }
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::DonationRecord;

// Re-export for convenience
pub use local::LocalStorage;

/// The persisted store document consumed by the leaderboard front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Always true for a document this crate wrote
    pub success: bool,

    /// Merged record set, latest first
    pub data: Vec<DonationRecord>,

    /// ISO 8601 timestamp of the last successful merge
    #[serde(rename = "lastUpdate")]
    pub last_update: DateTime<Utc>,

    /// Tag identifying which scraper produced the document
    pub source: String,
}

impl StoreDocument {
    pub fn new(data: Vec<DonationRecord>, source: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            last_update: Utc::now(),
            source: source.into(),
        }
    }

    pub fn empty(source: impl Into<String>) -> Self {
        Self::new(Vec::new(), source)
    }
}

/// Trait for record store backends.
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Load the current store document.
    ///
    /// A missing or unreadable store reads as the empty store; corruption is
    /// logged, never fatal.
    async fn load_store(&self) -> Result<StoreDocument>;

    /// Replace the store document atomically.
    async fn write_store(&self, document: &StoreDocument) -> Result<()>;
}
