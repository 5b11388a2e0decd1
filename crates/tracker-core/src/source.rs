//! Abstraction over the remote tracking service.
//!
//! The ingestion pipeline only depends on [`DataSource`], so it runs the
//! same against the HTTP client and against [`MockSource`](crate::MockSource).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tracker_types::PositionSample;

use crate::error::SourceResult;

/// A batch of fixes as returned by the tracking service.
///
/// An empty `positions` list is a valid answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionBatch {
    #[serde(default)]
    pub positions: Vec<PositionSample>,
}

/// Source of position samples.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch up to `limit` samples recorded from `since` onwards.
    ///
    /// A `since` of 0 asks for the service's default window. Samples are
    /// returned in the order the service reports them.
    async fn fetch_positions(&self, since: i64, limit: u32) -> SourceResult<Vec<PositionSample>>;

    /// Fetch the most recent fix reported by each device.
    async fn most_recent(&self) -> SourceResult<Vec<PositionSample>>;
}
