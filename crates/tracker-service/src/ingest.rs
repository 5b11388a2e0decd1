//! Position ingestion pipeline.
//!
//! One run pulls the samples recorded since the newest stored fix, places
//! each in its daily track, accrues the distance from the track's previous
//! point and persists the batch. Runs keep no state between invocations:
//! the resume timestamp and the last point of each track come from the
//! store every time, and overlapping runs are kept apart by a named lock
//! whose lease is renewed while the run waits on the source.

use std::time::Duration;

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tracker_core::geo::distance_km;
use tracker_core::{DataSource, SourceError};
use tracker_store::{LockGuard, Store};
use tracker_types::{Coordinate, DayTag, ParseError, PositionSample, TrackRow};

use crate::config::Settings;

/// Shortest interval between lock renewals during a fetch.
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(50);

/// Parameters of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Resume point for an empty store; runs before it do nothing.
    pub start_timestamp: i64,
    /// Offset day tags are computed in.
    pub utc_offset: UtcOffset,
    /// Maximum samples fetched per run.
    pub batch_size: u32,
    /// Lock serializing runs.
    pub lock_name: String,
    /// Wait budget passed to the store when taking the lock.
    pub lock_timeout: Duration,
}

impl IngestOptions {
    /// Options taken from resolved settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            start_timestamp: settings.start_timestamp,
            utc_offset: settings.utc_offset,
            batch_size: settings.batch_size,
            lock_name: settings.lock.name.clone(),
            lock_timeout: settings.lock.timeout,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The configured start date has not been reached.
    NotStarted,
    /// Another run holds the ingestion lock.
    Skipped,
    /// The source had nothing new.
    Empty,
    /// A batch was processed.
    Ingested(IngestReport),
}

/// Summary of a processed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    /// Timestamp the fetch resumed from.
    pub since: i64,
    /// Samples returned by the source.
    pub fetched: usize,
    /// Rows that were not already stored.
    pub inserted: usize,
    /// Distance accrued across the batch in kilometres.
    pub distance_km: f64,
    /// Tracks touched, in order of first appearance.
    pub tags: Vec<DayTag>,
    /// A full batch stored nothing new and every fix in it sat at the resume
    /// timestamp, so the next run would fetch the same batch again.
    pub stalled: bool,
}

/// Ingestion errors. Any of them aborts the run before or instead of
/// persisting the batch.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Store error: {0}")]
    Store(#[from] tracker_store::Error),
    #[error("Data source error: {0}")]
    Source(#[from] SourceError),
    #[error("Invalid sample: {0}")]
    Sample(#[from] ParseError),
    #[error("Lock '{0}' passed to another run before the batch was stored")]
    LockLost(String),
}

/// Ingestion pipeline bound to one store handle and one data source.
pub struct Pipeline<'a, S: DataSource + ?Sized> {
    store: &'a Store,
    source: &'a S,
    options: IngestOptions,
}

impl<'a, S: DataSource + ?Sized> Pipeline<'a, S> {
    /// Create a pipeline.
    pub fn new(store: &'a Store, source: &'a S, options: IngestOptions) -> Self {
        Self {
            store,
            source,
            options,
        }
    }

    /// Options the pipeline runs with.
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Run once, now.
    pub async fn run(&self) -> Result<RunOutcome, IngestError> {
        self.run_at(OffsetDateTime::now_utc().unix_timestamp()).await
    }

    /// Run once as if the current time were `now`.
    pub async fn run_at(&self, now: i64) -> Result<RunOutcome, IngestError> {
        if now < self.options.start_timestamp {
            info!(
                "Start date not reached ({} < {}), nothing to do",
                now, self.options.start_timestamp
            );
            return Ok(RunOutcome::NotStarted);
        }

        let Some(guard) = self
            .store
            .try_lock(&self.options.lock_name, self.options.lock_timeout)?
        else {
            info!(
                "Lock '{}' is held by another run, skipping",
                self.options.lock_name
            );
            return Ok(RunOutcome::Skipped);
        };

        let outcome = self.ingest(&guard).await;
        if let Err(e) = &outcome {
            error!("Ingestion run aborted: {}", e);
        }

        guard.release()?;
        outcome
    }

    async fn ingest(&self, guard: &LockGuard<'_>) -> Result<RunOutcome, IngestError> {
        let since = self
            .store
            .last_ingested_timestamp(self.options.start_timestamp)?;

        let samples = self.fetch(guard, since).await?;
        if samples.is_empty() {
            debug!("No new positions since {}", since);
            return Ok(RunOutcome::Empty);
        }

        keep_lock(guard)?;
        let report = self.ingest_batch(since, &samples)?;
        Ok(RunOutcome::Ingested(report))
    }

    /// Fetch the next batch, renewing the lock until the source answers.
    async fn fetch(
        &self,
        guard: &LockGuard<'_>,
        since: i64,
    ) -> Result<Vec<PositionSample>, IngestError> {
        let fetch = self.source.fetch_positions(since, self.options.batch_size);
        tokio::pin!(fetch);

        let period = (self.store.lock_lease() / 3).max(MIN_RENEW_INTERVAL);
        let mut renewal = tokio::time::interval(period);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        renewal.tick().await;

        loop {
            tokio::select! {
                biased;
                samples = &mut fetch => return Ok(samples?),
                _ = renewal.tick() => keep_lock(guard)?,
            }
        }
    }

    /// Segment and persist an already-fetched batch.
    ///
    /// Does not take the ingestion lock.
    pub fn ingest_batch(
        &self,
        since: i64,
        samples: &[PositionSample],
    ) -> Result<IngestReport, IngestError> {
        let rows = self.segment(samples)?;
        let inserted = self.store.insert_samples(&rows)?;

        let mut tags: Vec<DayTag> = Vec::new();
        for row in &rows {
            if !tags.contains(&row.tag) {
                tags.push(row.tag);
            }
        }

        let stalled = inserted == 0
            && samples.len() >= self.options.batch_size as usize
            && samples.iter().all(|s| s.timestamp == since);
        if stalled {
            warn!(
                "Batch of {} held only fixes already stored at {}; the batch size is too \
                 small to get past them",
                samples.len(),
                since
            );
        }

        let report = IngestReport {
            since,
            fetched: samples.len(),
            inserted,
            distance_km: rows.iter().map(|r| r.distance_km).sum(),
            tags,
            stalled,
        };

        info!(
            "Ingested {} of {} samples ({:.3} km) into {} track(s)",
            report.inserted,
            report.fetched,
            report.distance_km,
            report.tags.len()
        );
        Ok(report)
    }

    /// Place samples into daily tracks and compute their distances.
    ///
    /// Samples are taken in the order given. The first sample of each run
    /// of same-day samples is measured from the last stored point of that
    /// day, never from a point of another day.
    pub fn segment(&self, samples: &[PositionSample]) -> Result<Vec<TrackRow>, IngestError> {
        let mut rows = Vec::with_capacity(samples.len());
        let mut current_tag: Option<DayTag> = None;
        let mut previous: Option<Coordinate> = None;

        for sample in samples {
            let tag = DayTag::from_timestamp(sample.timestamp, self.options.utc_offset)?;
            let point = sample.coordinate();
            if !point.is_valid() {
                return Err(ParseError::InvalidData(format!(
                    "position {} of device {} at {} is out of range",
                    point, sample.device_key, sample.timestamp
                ))
                .into());
            }

            if current_tag != Some(tag) {
                previous = None;
            }
            if previous.is_none() {
                previous = self.store.last_point_of_track(&tag)?;
                if let Some(point) = previous {
                    debug!("Continuing track {} from {}", tag, point);
                }
            }

            let distance = previous.map_or(0.0, |from| distance_km(from, point));
            rows.push(TrackRow::from_sample(sample, tag, previous, distance));

            previous = Some(point);
            current_tag = Some(tag);
        }

        Ok(rows)
    }
}

fn keep_lock(guard: &LockGuard<'_>) -> Result<(), IngestError> {
    if guard.renew()? {
        Ok(())
    } else {
        Err(IngestError::LockLost(guard.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use tracker_core::MockSource;
    use tracker_core::geo::haversine_km;

    use super::*;

    const AUG_24_MIDNIGHT: i64 = 1_314_144_000;
    const AUG_24_15H: i64 = 1_314_198_000;
    const DAY: i64 = 86_400;

    fn options() -> IngestOptions {
        IngestOptions {
            start_timestamp: AUG_24_MIDNIGHT,
            utc_offset: UtcOffset::UTC,
            batch_size: 100,
            lock_name: "ingestion".to_string(),
            lock_timeout: Duration::from_secs(1),
        }
    }

    fn sample(timestamp: i64, latitude: f64, longitude: f64) -> PositionSample {
        PositionSample {
            device_key: "584739201".to_string(),
            timestamp,
            latitude,
            longitude,
            altitude: 30.0,
            speed: 5.0,
            heading: 180.0,
        }
    }

    fn tag(s: &str) -> DayTag {
        s.parse().unwrap()
    }

    #[test]
    fn test_segment_first_sample_of_unseen_tag() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let rows = pipeline.segment(&[sample(AUG_24_15H, 51.5, -0.1)]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].previous, None);
        assert_eq!(rows[0].distance_km, 0.0);
        assert_eq!(rows[0].tag, tag("20110824"));
    }

    #[test]
    fn test_segment_accrues_within_batch() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let rows = pipeline
            .segment(&[
                sample(AUG_24_15H, 51.5, -0.1),
                sample(AUG_24_15H + 60, 51.6, -0.1),
                sample(AUG_24_15H + 120, 51.5, -0.1),
            ])
            .unwrap();

        let d1 = haversine_km(51.5, -0.1, 51.6, -0.1);
        let d2 = haversine_km(51.6, -0.1, 51.5, -0.1);
        assert_eq!(rows[1].previous, Some(Coordinate::new(51.5, -0.1)));
        assert_eq!(rows[1].distance_km, d1);
        assert_eq!(rows[2].previous, Some(Coordinate::new(51.6, -0.1)));
        assert_eq!(rows[2].distance_km, d2);
    }

    #[test]
    fn test_segment_identical_points() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let rows = pipeline
            .segment(&[sample(AUG_24_15H, 51.5, -0.1), sample(AUG_24_15H + 60, 51.5, -0.1)])
            .unwrap();
        assert_eq!(rows[1].distance_km, 0.0);
        assert!(rows[1].previous.is_some());
    }

    #[test]
    fn test_segment_resets_at_day_boundary() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let rows = pipeline
            .segment(&[
                sample(AUG_24_MIDNIGHT + DAY - 60, 51.5, -0.1),
                sample(AUG_24_MIDNIGHT + DAY, 51.6, -0.1),
            ])
            .unwrap();

        assert_eq!(rows[0].tag, tag("20110824"));
        assert_eq!(rows[1].tag, tag("20110825"));
        assert_eq!(rows[1].previous, None);
        assert_eq!(rows[1].distance_km, 0.0);
    }

    #[test]
    fn test_segment_day_boundary_follows_offset() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let mut opts = options();
        opts.utc_offset = UtcOffset::from_hms(1, 0, 0).unwrap();
        let pipeline = Pipeline::new(&store, &source, opts);

        // 23:30 UTC is already the next day at +01:00
        let rows = pipeline
            .segment(&[sample(AUG_24_MIDNIGHT + DAY - 1800, 51.5, -0.1)])
            .unwrap();
        assert_eq!(rows[0].tag, tag("20110825"));
    }

    #[test]
    fn test_segment_seeds_from_stored_track() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        pipeline
            .ingest_batch(0, &[sample(AUG_24_15H, 51.5, -0.1)])
            .unwrap();

        let rows = pipeline.segment(&[sample(AUG_24_15H + 60, 51.6, -0.1)]).unwrap();
        assert_eq!(rows[0].previous, Some(Coordinate::new(51.5, -0.1)));
        assert_eq!(rows[0].distance_km, haversine_km(51.5, -0.1, 51.6, -0.1));
    }

    #[test]
    fn test_segment_never_seeds_from_previous_day() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        pipeline
            .ingest_batch(0, &[sample(AUG_24_15H, 51.5, -0.1)])
            .unwrap();

        let rows = pipeline
            .segment(&[sample(AUG_24_15H + DAY, 51.6, -0.1)])
            .unwrap();
        assert_eq!(rows[0].previous, None);
        assert_eq!(rows[0].distance_km, 0.0);
    }

    #[test]
    fn test_segment_returning_to_an_earlier_day_reseeds() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        pipeline
            .ingest_batch(0, &[sample(AUG_24_15H, 51.5, -0.1)])
            .unwrap();

        // Out-of-order batch: 24th, 25th, then 24th again
        let rows = pipeline
            .segment(&[
                sample(AUG_24_15H + 60, 51.6, -0.1),
                sample(AUG_24_15H + DAY, 40.0, 0.0),
                sample(AUG_24_15H + 120, 51.7, -0.1),
            ])
            .unwrap();

        assert_eq!(rows[1].previous, None);
        // Seeded from the store, which does not yet hold the 51.6 point
        assert_eq!(rows[2].previous, Some(Coordinate::new(51.5, -0.1)));
    }

    #[test]
    fn test_ingest_batch_report() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let report = pipeline
            .ingest_batch(
                AUG_24_MIDNIGHT,
                &[
                    sample(AUG_24_15H, 51.5, -0.1),
                    sample(AUG_24_15H + 60, 51.6, -0.1),
                    sample(AUG_24_15H + DAY, 51.6, -0.1),
                ],
            )
            .unwrap();

        assert_eq!(report.since, AUG_24_MIDNIGHT);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.tags, vec![tag("20110824"), tag("20110825")]);
        assert!((report.distance_km - haversine_km(51.5, -0.1, 51.6, -0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_ingest_batch_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());
        let batch = [
            sample(AUG_24_15H, 51.5, -0.1),
            sample(AUG_24_15H + 60, 51.6, -0.1),
            sample(AUG_24_15H + 120, 51.5, -0.1),
        ];

        pipeline.ingest_batch(0, &batch).unwrap();
        let distance = store.sum_distance(&tag("20110824")).unwrap();

        let report = pipeline.ingest_batch(0, &batch).unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(store.count_positions(None).unwrap(), 3);
        assert_eq!(store.sum_distance(&tag("20110824")).unwrap(), distance);
    }

    #[test]
    fn test_invalid_timestamp_aborts_before_persisting() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let err = pipeline
            .ingest_batch(0, &[sample(AUG_24_15H, 51.5, -0.1), sample(i64::MAX, 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, IngestError::Sample(_)));
        assert_eq!(store.count_positions(None).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_coordinate_aborts_before_persisting() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let err = pipeline
            .ingest_batch(0, &[sample(AUG_24_15H, 51.5, -0.1), sample(AUG_24_15H + 60, 91.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, IngestError::Sample(ParseError::InvalidData(_))));
        assert_eq!(store.count_positions(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_batch_of_stored_fixes_is_flagged() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::with_samples(vec![
            sample(AUG_24_15H, 51.5, -0.1),
            sample(AUG_24_15H + 60, 51.6, -0.1),
            sample(AUG_24_15H + 120, 51.7, -0.1),
        ]);
        let pipeline = Pipeline::new(
            &store,
            &source,
            IngestOptions {
                batch_size: 1,
                ..options()
            },
        );

        let RunOutcome::Ingested(first) = pipeline.run_at(AUG_24_15H).await.unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(first.inserted, 1);
        assert!(!first.stalled);

        // Only the newest stored fix fits, so the run cannot move on
        let RunOutcome::Ingested(second) = pipeline.run_at(AUG_24_15H).await.unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(second.since, AUG_24_15H);
        assert_eq!(second.inserted, 0);
        assert!(second.stalled);
        assert_eq!(store.count_positions(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_minimum_batch_gets_past_two_devices_sharing_a_second() {
        let store = Store::open_in_memory().unwrap();
        let fix = |device: &str, timestamp: i64| PositionSample {
            device_key: device.to_string(),
            ..sample(timestamp, 51.5, -0.1)
        };
        let source = MockSource::with_samples(vec![
            fix("1", AUG_24_15H),
            fix("2", AUG_24_15H),
            fix("1", AUG_24_15H + 60),
            fix("2", AUG_24_15H + 60),
            fix("1", AUG_24_15H + 120),
            fix("2", AUG_24_15H + 120),
        ]);
        let pipeline = Pipeline::new(
            &store,
            &source,
            IngestOptions {
                batch_size: crate::config::MIN_BATCH_SIZE,
                ..options()
            },
        );

        for _ in 0..5 {
            if let RunOutcome::Ingested(report) = pipeline.run_at(AUG_24_15H).await.unwrap() {
                assert!(!report.stalled);
            }
        }
        assert_eq!(store.count_positions(None).unwrap(), 6);
    }

    #[tokio::test]
    async fn test_caught_up_run_is_not_a_stall() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::with_samples(vec![sample(AUG_24_15H, 51.5, -0.1)]);
        let pipeline = Pipeline::new(&store, &source, options());

        pipeline.run_at(AUG_24_15H).await.unwrap();
        let RunOutcome::Ingested(report) = pipeline.run_at(AUG_24_15H).await.unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(report.inserted, 0);
        assert!(!report.stalled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_lost_during_fetch_aborts_before_persisting() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::with_samples(vec![sample(AUG_24_15H, 51.5, -0.1)]);
        source.set_latency(Duration::from_secs(1));
        let pipeline = Pipeline::new(&store, &source, options());

        let (outcome, ()) = tokio::join!(pipeline.run_at(AUG_24_15H), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            store.release_lock("ingestion").unwrap();
        });

        assert!(matches!(outcome, Err(IngestError::LockLost(name)) if name == "ingestion"));
        assert_eq!(store.count_positions(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_before_start_date() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let outcome = pipeline.run_at(AUG_24_MIDNIGHT - 1).await.unwrap();
        assert_eq!(outcome, RunOutcome::NotStarted);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_run_empty_store_resumes_from_start_date() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::new();
        let pipeline = Pipeline::new(&store, &source, options());

        let outcome = pipeline.run_at(AUG_24_15H).await.unwrap();
        assert_eq!(outcome, RunOutcome::Empty);
        assert_eq!(source.calls().await, vec![(AUG_24_MIDNIGHT, 100)]);
        assert!(store.held_locks().is_empty());
    }

    #[tokio::test]
    async fn test_run_ingests_and_resumes() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::with_samples(vec![
            sample(AUG_24_15H, 51.5, -0.1),
            sample(AUG_24_15H + 60, 51.6, -0.1),
        ]);
        let pipeline = Pipeline::new(&store, &source, options());

        let RunOutcome::Ingested(report) = pipeline.run_at(AUG_24_15H + 60).await.unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(report.inserted, 2);

        source.push(sample(AUG_24_15H + 120, 51.5, -0.1)).await;
        let RunOutcome::Ingested(report) = pipeline.run_at(AUG_24_15H + 120).await.unwrap() else {
            panic!("expected a batch");
        };

        // The newest stored fix is fetched again and ignored
        assert_eq!(report.since, AUG_24_15H + 60);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.inserted, 1);

        let expected = haversine_km(51.5, -0.1, 51.6, -0.1) + haversine_km(51.6, -0.1, 51.5, -0.1);
        let stored = store.sum_distance(&tag("20110824")).unwrap();
        assert!((stored - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_skips_when_locked_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.db");
        let other = Store::open(&path).unwrap();
        let store = Store::open(&path).unwrap();
        assert!(other.acquire_lock("ingestion", Duration::from_secs(1)).unwrap());

        let source = MockSource::with_samples(vec![sample(AUG_24_15H, 51.5, -0.1)]);
        let pipeline = Pipeline::new(&store, &source, options());

        assert_eq!(pipeline.run_at(AUG_24_15H).await.unwrap(), RunOutcome::Skipped);
        assert_eq!(source.fetch_count(), 0);
        assert_eq!(store.count_positions(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_and_releases_lock() {
        let store = Store::open_in_memory().unwrap();
        let source = MockSource::with_samples(vec![sample(AUG_24_15H, 51.5, -0.1)]);
        source.set_should_fail(true);
        let pipeline = Pipeline::new(&store, &source, options());

        let err = pipeline.run_at(AUG_24_15H).await.unwrap_err();
        assert!(matches!(err, IngestError::Source(_)));
        assert_eq!(store.count_positions(None).unwrap(), 0);
        assert!(store.held_locks().is_empty());

        source.set_should_fail(false);
        assert!(matches!(
            pipeline.run_at(AUG_24_15H).await.unwrap(),
            RunOutcome::Ingested(_)
        ));
    }
}
