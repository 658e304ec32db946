// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod donation;
mod streamer;

// Re-export all public types
pub use config::{
    ClassifyConfig, Config, DedupConfig, DomSelectors, FetcherConfig, PollConfig, SourceConfig,
};
pub use donation::{derive_identity_key, DonationRecord, UNCLASSIFIED};
pub use streamer::StreamerKeywordSet;
