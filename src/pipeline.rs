use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointState, CheckpointStore};
use crate::config::ScrapeConfig;
use crate::error::{ExtractError, FetchError};
use crate::extract;
use crate::fetch::Fetcher;
use crate::record::{FoodId, ValidatedRecord};
use crate::skipped::SkippedLog;
use crate::validate;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Final run accounting. Genuine gaps (the site has no such item) are
/// counted apart from items where the scrape itself failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub with_records: usize,
    pub zero_records: usize,
    pub failed: usize,
    pub rejected_rows: usize,
    pub total_records: usize,
    pub interrupted: bool,
}

enum Outcome {
    Rows {
        records: Vec<ValidatedRecord>,
        rejected: usize,
    },
    /// Terminal-per-item zero-yield: not found, or unrecognizable structure.
    Gap(&'static str),
    Failed(FetchError),
}

/// Drives the id range through fetch, extract, and validate, owning the
/// checkpoint state for the whole run. Strictly sequential: one in-flight
/// fetch at a time, rate-limited by the fetcher's randomized delay.
pub struct Pipeline<F: Fetcher> {
    config: ScrapeConfig,
    fetcher: F,
    store: CheckpointStore,
    skipped: SkippedLog,
    state: CheckpointState,
}

impl<F: Fetcher> Pipeline<F> {
    /// Build a pipeline, loading the checkpoint when resuming. A corrupt
    /// checkpoint with no usable backup aborts here rather than silently
    /// restarting from scratch.
    pub fn new(
        config: ScrapeConfig,
        fetcher: F,
        store: CheckpointStore,
        skipped: SkippedLog,
    ) -> Result<Self> {
        let state = if config.resume {
            store.load()?.unwrap_or_default()
        } else {
            CheckpointState::default()
        };
        Ok(Self {
            config,
            fetcher,
            store,
            skipped,
            state,
        })
    }

    /// Forget previous outcomes for `ids` so retry-skipped can reprocess
    /// them.
    pub fn reopen(&mut self, ids: &[FoodId]) {
        for &id in ids {
            self.state.reopen(id);
        }
    }

    /// Run the configured range, skipping ids already completed.
    pub async fn run(self) -> Result<(RunSummary, Vec<ValidatedRecord>)> {
        let ids: Vec<FoodId> = (self.config.start_id..=self.config.end_id)
            .filter(|id| !self.state.is_completed(*id))
            .collect();
        self.run_ids(ids).await
    }

    /// Drive a specific id list through the pipeline.
    pub async fn run_ids(mut self, ids: Vec<FoodId>) -> Result<(RunSummary, Vec<ValidatedRecord>)> {
        let mut summary = RunSummary::default();
        info!(
            "Scraping {} ids ({} already completed)",
            ids.len(),
            self.state.completed_ids.len()
        );

        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut since_save = 0usize;
        for id in ids {
            // Cancellation leaves the in-flight id unmarked: it was never
            // added to completed_ids, so a resumed run picks it up again.
            let outcome = tokio::select! {
                outcome = self.process_one(id) => outcome,
                _ = signal::ctrl_c() => {
                    warn!("Interrupted; ID {} left unmarked", id);
                    summary.interrupted = true;
                    break;
                }
            };

            summary.attempted += 1;
            match outcome {
                Outcome::Rows { records, rejected } => {
                    summary.rejected_rows += rejected;
                    if records.is_empty() {
                        summary.zero_records += 1;
                        debug!("ID {}: no records", id);
                    } else {
                        summary.with_records += 1;
                        summary.total_records += records.len();
                        info!("ID {}: {} records", id, records.len());
                        self.skipped.remove(id)?;
                    }
                    self.state.complete(id, records);
                }
                Outcome::Gap(reason) => {
                    summary.zero_records += 1;
                    debug!("ID {}: {} (zero records)", id, reason);
                    if reason == "malformed_page" {
                        self.skipped.record(id, reason, None)?;
                    }
                    self.state.complete(id, Vec::new());
                }
                Outcome::Failed(err) => {
                    summary.failed += 1;
                    error!(
                        "ID {}: failed after {} attempts: {}",
                        id,
                        MAX_RETRIES + 1,
                        err
                    );
                    self.skipped.record(id, "fetch_failed", Some(err.to_string()))?;
                    // Marked completed so a resumed run does not loop on a
                    // dead item; retry-skipped can reopen it deliberately.
                    self.state.complete(id, Vec::new());
                }
            }

            since_save += 1;
            if since_save >= self.config.checkpoint_frequency {
                self.persist()?;
                since_save = 0;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        // Best-effort on interrupt, mandatory at clean shutdown.
        self.persist()?;

        info!(
            "Run complete: {} attempted, {} with records, {} zero-record, {} failed, {} rows",
            summary.attempted,
            summary.with_records,
            summary.zero_records,
            summary.failed,
            summary.total_records
        );

        let records = self.state.records.clone();
        Ok((summary, records))
    }

    async fn process_one(&mut self, id: FoodId) -> Outcome {
        debug!("ID {}: started", id);

        let html = match self.fetch_with_retry(id).await {
            Ok(html) => html,
            Err(FetchError::NotFound) => return Outcome::Gap("not_found"),
            Err(err) => return Outcome::Failed(err),
        };

        let raw = match extract::extract(&html, id) {
            Ok(rows) => rows,
            Err(ExtractError::MalformedPage(why)) => {
                warn!("ID {}: malformed page: {}", id, why);
                return Outcome::Gap("malformed_page");
            }
        };

        let mut records = Vec::new();
        let mut rejected = 0;
        for row in &raw {
            match validate::validate(row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!("ID {}: rejected row ({})", id, reason);
                    rejected += 1;
                }
            }
        }
        Outcome::Rows { records, rejected }
    }

    /// Bounded retry loop for transient fetch failures: base delay doubling
    /// per attempt, capped. NotFound passes straight through.
    async fn fetch_with_retry(&mut self, id: FoodId) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(id).await {
                Ok(html) => return Ok(html),
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    let backoff = backoff_delay(attempt);
                    warn!(
                        "ID {}: {} (attempt {}/{}), backing off {:.1}s",
                        id,
                        err,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn persist(&mut self) -> Result<()> {
        self.state.last_saved = Some(Utc::now());
        self.store.save(&self.state)?;
        info!(
            "Checkpoint saved: {} ids, {} records",
            self.state.completed_ids.len(),
            self.state.records.len()
        );
        Ok(())
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let ms = (BASE_BACKOFF_MS * 2u64.pow(attempt)).min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}
