//! Mock data source for testing.
//!
//! [`MockSource`] implements [`DataSource`] over an in-memory list of
//! samples, so the ingestion pipeline can be exercised without a network.
//!
//! # Features
//!
//! - **Failure injection**: fail every fetch, or only the next few
//! - **Call recording**: inspect the `(since, limit)` of each fetch
//! - **Latency simulation**: delay each fetch to exercise overlapping runs

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tracker_types::PositionSample;

use crate::error::{SourceError, SourceResult};
use crate::source::DataSource;

/// A mock tracking service.
///
/// Fetches return the stored samples whose timestamp is at or after `since`,
/// in insertion order, truncated to `limit`.
///
/// # Example
///
/// ```
/// use tracker_core::{DataSource, MockSource};
/// use tracker_types::PositionSample;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockSource::new();
///     source
///         .push(PositionSample {
///             device_key: "1".into(),
///             timestamp: 1_314_198_000,
///             latitude: 51.5,
///             longitude: -0.1,
///             altitude: 0.0,
///             speed: 0.0,
///             heading: 0.0,
///         })
///         .await;
///
///     let samples = source.fetch_positions(0, 10).await.unwrap();
///     assert_eq!(samples.len(), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockSource {
    samples: RwLock<Vec<PositionSample>>,
    calls: RwLock<Vec<(i64, u32)>>,
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    fetch_count: AtomicU32,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockSource {
    /// Create an empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source serving `samples`.
    pub fn with_samples(samples: Vec<PositionSample>) -> Self {
        Self {
            samples: RwLock::new(samples),
            ..Self::default()
        }
    }

    /// Append a sample.
    pub async fn push(&self, sample: PositionSample) {
        self.samples.write().await.push(sample);
    }

    /// Append several samples.
    pub async fn extend(&self, samples: Vec<PositionSample>) {
        self.samples.write().await.extend(samples);
    }

    /// Fail every fetch until cleared.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` fetches, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay each fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of fetches performed, including failed ones.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// `(since, limit)` of every fetch, in order.
    pub async fn calls(&self) -> Vec<(i64, u32)> {
        self.calls.read().await.clone()
    }

    async fn check_should_fail(&self) -> SourceResult<()> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(SourceError::Unavailable("mock transient failure".to_string()));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(SourceError::Unavailable("mock failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_positions(&self, since: i64, limit: u32) -> SourceResult<Vec<PositionSample>> {
        self.calls.write().await.push((since, limit));
        self.check_should_fail().await?;

        let samples = self.samples.read().await;
        Ok(samples
            .iter()
            .filter(|s| s.timestamp >= since)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn most_recent(&self) -> SourceResult<Vec<PositionSample>> {
        self.check_should_fail().await?;

        let samples = self.samples.read().await;
        Ok(samples
            .iter()
            .max_by_key(|s| s.timestamp)
            .cloned()
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64) -> PositionSample {
        PositionSample {
            device_key: "1".to_string(),
            timestamp,
            latitude: 51.5,
            longitude: -0.1,
            altitude: 0.0,
            speed: 0.0,
            heading: 0.0,
        }
    }

    #[tokio::test]
    async fn test_fetch_filters_and_limits() {
        let source = MockSource::with_samples(vec![sample(10), sample(20), sample(30), sample(40)]);

        let fetched = source.fetch_positions(20, 2).await.unwrap();
        let stamps: Vec<_> = fetched.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![20, 30]);
        assert_eq!(source.calls().await, vec![(20, 2)]);
    }

    #[tokio::test]
    async fn test_fetch_keeps_received_order() {
        let source = MockSource::with_samples(vec![sample(30), sample(10), sample(20)]);

        let fetched = source.fetch_positions(0, 10).await.unwrap();
        let stamps: Vec<_> = fetched.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let source = MockSource::with_samples(vec![sample(10)]);
        source.set_transient_failures(2);

        assert!(source.fetch_positions(0, 10).await.is_err());
        assert!(source.fetch_positions(0, 10).await.is_err());
        assert!(source.fetch_positions(0, 10).await.is_ok());
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_should_fail() {
        let source = MockSource::new();
        source.set_should_fail(true);
        assert!(matches!(
            source.fetch_positions(0, 10).await,
            Err(SourceError::Unavailable(_))
        ));

        source.set_should_fail(false);
        assert!(source.fetch_positions(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_most_recent() {
        let source = MockSource::new();
        assert!(source.most_recent().await.unwrap().is_empty());

        source.extend(vec![sample(10), sample(30), sample(20)]).await;
        let latest = source.most_recent().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].timestamp, 30);
    }
}
