//! Query builder for stored positions.
//!
//! [`PositionQuery`] follows the builder pattern: every filter is optional
//! and can be chained in any order.
//!
//! # Example
//!
//! ```
//! use tracker_store::{PositionQuery, Store};
//!
//! let store = Store::open_in_memory()?;
//!
//! // The whole of one day's track, in the order it was driven
//! let tag = "20110824".parse()?;
//! let track = store.query_positions(&PositionQuery::new().tag(tag).oldest_first())?;
//!
//! // Most recent fix on or after a given time
//! let latest = store.query_positions(&PositionQuery::new().since(1_314_198_000).limit(1))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use tracker_types::DayTag;

/// Fluent query builder for stored positions.
///
/// By default, queries return results ordered by timestamp descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct PositionQuery {
    /// Filter by device key.
    pub device_key: Option<String>,
    /// Filter by daily track.
    pub tag: Option<DayTag>,
    /// Filter to fixes at or after this unix timestamp.
    pub since: Option<i64>,
    /// Filter to fixes at or before this unix timestamp.
    pub until: Option<i64>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl PositionQuery {
    /// Create a new query: all devices, all tracks, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by device key.
    pub fn device(mut self, device_key: &str) -> Self {
        self.device_key = Some(device_key.to_string());
        self
    }

    /// Only include fixes of one daily track.
    pub fn tag(mut self, tag: DayTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Filter to fixes at or after this unix timestamp.
    pub fn since(mut self, timestamp: i64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// Filter to fixes at or before this unix timestamp.
    pub fn until(mut self, timestamp: i64) -> Self {
        self.until = Some(timestamp);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results chronologically.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_key) = self.device_key {
            conditions.push("device_key = ?");
            params.push(Box::new(device_key.clone()));
        }

        if let Some(tag) = self.tag {
            conditions.push("track_tag = ?");
            params.push(Box::new(tag.to_string()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(until));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_key, timestamp, prev_latitude, prev_longitude, latitude, \
             longitude, altitude, speed, heading, distance_km, track_tag \
             FROM positions {} ORDER BY timestamp {}",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            if self.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}
