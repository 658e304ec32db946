//! Pipeline stages for donation ingestion.
//!
//! - `merge`: exact-key and fuzzy-window deduplication into the store
//! - `classify`: keyword attribution of donations to streamers
//! - `poll`: the cycle orchestrator and its IDLE/ACTIVE state machine

pub mod classify;
pub mod merge;
pub mod poll;

pub use classify::{reclassify, Classification, Classifier};
pub use merge::{merge_records, sort_store, MergeOutcome};
pub use poll::{run_cycle, run_poll_loop, CycleOutcome, PollPhase, PollState};
