// src/pipeline/poll.rs

//! Polling loop: fetch → extract → normalize → classify → merge → persist.
//!
//! The loop runs one cycle at a time against a single source URL and adapts
//! its cadence to observed activity:
//!
//! - `Active`: new distinct records were seen recently; poll on the short
//!   interval.
//! - `Idle`: the source has been quiet past the configured period; poll on
//!   the long interval.
//!
//! Cycle failures are logged and retried after a fixed backoff. The loop
//! only ends on Ctrl-C.

use std::time::{Duration, Instant};

use chrono::Local;

use crate::error::Result;
use crate::models::{Config, DonationRecord};
use crate::pipeline::classify::Classifier;
use crate::pipeline::merge::merge_records;
use crate::services::extractor::{extract_dom, extract_payload};
use crate::services::fetcher::PageFetcher;
use crate::storage::{RecordStorage, StoreDocument};

/// Activity phase of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// No recent new data; long poll interval.
    Idle,
    /// New data observed within the quiet period; short poll interval.
    Active,
}

/// Process-scoped loop state, owned by the loop and passed explicitly.
#[derive(Debug)]
pub struct PollState {
    phase: PollPhase,
    last_new_data: Instant,
}

impl PollState {
    pub fn new() -> Self {
        Self {
            phase: PollPhase::Idle,
            last_new_data: Instant::now(),
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Feed one cycle's result into the state machine.
    ///
    /// Any new distinct record flips IDLE to ACTIVE immediately; ACTIVE
    /// falls back to IDLE once the quiet period elapses with nothing new.
    pub fn observe(&mut self, new_records: usize, now: Instant, quiet_period: Duration) {
        if new_records > 0 {
            self.last_new_data = now;
            if self.phase == PollPhase::Idle {
                log::info!("New donations observed, switching to active polling");
                self.phase = PollPhase::Active;
            }
        } else if self.phase == PollPhase::Active
            && now.duration_since(self.last_new_data) >= quiet_period
        {
            log::info!("Source quiet, falling back to idle polling");
            self.phase = PollPhase::Idle;
        }
    }

    /// Poll interval for the current phase.
    pub fn interval(&self, config: &Config) -> Duration {
        let secs = match self.phase {
            PollPhase::Active => config.poll.active_interval_secs,
            PollPhase::Idle => config.poll.idle_interval_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a single poll cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Records extracted from both channels before dedup.
    pub extracted: usize,
    /// Distinct new records merged into the store.
    pub added: usize,
    /// Batch records dropped as exact-key duplicates.
    pub exact_collapsed: usize,
    /// Batch records dropped by the fuzzy window.
    pub fuzzy_collapsed: usize,
    /// Store size after the merge.
    pub store_size: usize,
}

/// Run one fetch → extract → merge → persist cycle.
pub async fn run_cycle(
    config: &Config,
    classifier: &Classifier,
    storage: &dyn RecordStorage,
    fetcher: &mut dyn PageFetcher,
) -> Result<CycleOutcome> {
    let capture = fetcher.fetch(&config.source.url).await?;
    let now = Local::now().naive_local();

    // Both channels feed the same batch; the merge does not care which one
    // a record arrived on.
    let mut batch: Vec<DonationRecord> = Vec::new();
    for payload in &capture.payloads {
        batch.extend(extract_payload(
            payload,
            &config.classify.game_amounts,
            now,
        ));
    }
    if let Some(html) = &capture.html {
        batch.extend(extract_dom(
            html,
            &config.fetcher.dom,
            &config.classify.game_amounts,
            now,
        ));
    }

    log::debug!(
        "Extracted {} records ({} payloads, dom: {})",
        batch.len(),
        capture.payloads.len(),
        capture.html.is_some()
    );

    // Inline classification runs against the literal target field only; the
    // message-based pass is the offline reclassify batch job.
    for record in &mut batch {
        if record.is_classified() {
            if let Some(name) = classifier.resolve(&record.target_name, "") {
                record.target_name = name;
            }
        }
    }

    let existing = storage.load_store().await?;
    let window = chrono::Duration::seconds(config.dedup.fuzzy_window_secs as i64);
    let merged = merge_records(&existing.data, &batch, window);

    let outcome = CycleOutcome {
        extracted: batch.len(),
        added: merged.added,
        exact_collapsed: merged.exact_collapsed,
        fuzzy_collapsed: merged.fuzzy_collapsed,
        store_size: merged.records.len(),
    };

    let document = StoreDocument::new(merged.records, &config.source.tag);
    storage.write_store(&document).await?;

    Ok(outcome)
}

/// Run the polling loop until interrupted.
pub async fn run_poll_loop(
    config: &Config,
    classifier: &Classifier,
    storage: &dyn RecordStorage,
    fetcher: &mut dyn PageFetcher,
) -> Result<()> {
    let mut state = PollState::new();
    let quiet_period = Duration::from_secs(config.poll.quiet_period_secs);
    let backoff = Duration::from_secs(config.poll.retry_backoff_secs);

    log::info!(
        "Polling {} ({}s active / {}s idle interval)",
        config.source.url,
        config.poll.active_interval_secs,
        config.poll.idle_interval_secs
    );

    loop {
        let wait = match run_cycle(config, classifier, storage, fetcher).await {
            Ok(outcome) => {
                state.observe(outcome.added, Instant::now(), quiet_period);
                log::info!(
                    "Cycle done: {} extracted, {} new, {} exact dup, {} fuzzy dup, {} in store [{:?}]",
                    outcome.extracted,
                    outcome.added,
                    outcome.exact_collapsed,
                    outcome.fuzzy_collapsed,
                    outcome.store_size,
                    state.phase()
                );
                state.interval(config)
            }
            Err(e) => {
                log::warn!(
                    "Cycle failed: {}. Retrying in {}s",
                    e,
                    config.poll.retry_backoff_secs
                );
                backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping poll loop");
                break;
            }
        }
    }

    Ok(())
}
