//! Repeated ingestion runs.
//!
//! Every tick performs an independent [`Pipeline`] run that rebuilds its
//! state from the store. Failures are logged and the loop carries on; the
//! next tick resumes from whatever was persisted.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use tracker_core::DataSource;

use crate::export::Exporter;
use crate::ingest::{Pipeline, RunOutcome};

/// Counters for a scheduler session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Runs started.
    pub runs: u32,
    /// Runs that ended with an error.
    pub failures: u32,
    /// Runs skipped because another run held the lock.
    pub skipped: u32,
    /// Rows persisted across all runs.
    pub inserted: usize,
}

/// Runs the ingestion pipeline on a fixed interval.
pub struct Scheduler<'a, S: DataSource + ?Sized> {
    pipeline: Pipeline<'a, S>,
    period: Duration,
    exporter: Option<Exporter<'a>>,
}

impl<'a, S: DataSource + ?Sized> Scheduler<'a, S> {
    /// Create a scheduler running `pipeline` every `period`.
    pub fn new(pipeline: Pipeline<'a, S>, period: Duration) -> Self {
        Self {
            pipeline,
            period,
            exporter: None,
        }
    }

    /// Also export tracks after every run that stored new rows.
    pub fn with_exporter(mut self, exporter: Exporter<'a>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Run until `shutdown` completes.
    ///
    /// The first run starts immediately. A run in progress when `shutdown`
    /// completes is abandoned; its lock is released as it unwinds.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> RunStats {
        info!("Starting scheduler (interval: {}s)", self.period.as_secs());

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = RunStats::default();
        let mut consecutive_failures = 0u32;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping after {} run(s)", stats.runs);
                    return stats;
                }
                _ = ticker.tick() => {}
            }

            stats.runs += 1;
            let outcome = tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping during run {}", stats.runs);
                    return stats;
                }
                outcome = self.pipeline.run() => outcome,
            };

            match outcome {
                Ok(outcome) => {
                    consecutive_failures = 0;
                    self.after_run(&outcome, &mut stats);
                }
                Err(e) => {
                    stats.failures += 1;
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!("Ingestion run failed: {} (attempt {})", e, consecutive_failures);
                    } else if consecutive_failures == 4 {
                        error!(
                            "Ingestion failed {} times in a row, will continue trying silently",
                            consecutive_failures
                        );
                    }
                }
            }
        }
    }

    fn after_run(&self, outcome: &RunOutcome, stats: &mut RunStats) {
        match outcome {
            RunOutcome::Skipped => stats.skipped += 1,
            RunOutcome::Ingested(report) => {
                stats.inserted += report.inserted;
                if report.inserted > 0
                    && let Some(exporter) = &self.exporter
                    && let Err(e) = exporter.export_all()
                {
                    warn!("Export after ingestion failed: {}", e);
                }
            }
            RunOutcome::NotStarted | RunOutcome::Empty => {}
        }
    }
}
