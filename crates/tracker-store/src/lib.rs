//! Local persistence for GPS position tracks.
//!
//! This crate provides SQLite-based storage for ingested position fixes,
//! the settled per-day mileage ledger, and the named locks used to keep
//! overlapping ingestion runs apart.
//!
//! # Features
//!
//! - Idempotent batch inserts keyed by device and timestamp
//! - Per-day track queries (last point, accumulated distance, points)
//! - Append-once stage mileage ledger
//! - Named advisory locks owned by a store handle
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tracker_store::{Dsn, Store};
//!
//! let dsn: Dsn = "localhost|tracker|secret|/var/lib/gps-tracker/tracks.db".parse()?;
//! let store = Store::connect(&dsn)?;
//!
//! if let Some(_guard) = store.try_lock("ingestion", Duration::from_secs(10))? {
//!     let since = store.last_ingested_timestamp(1_314_144_000)?;
//!     println!("resuming after {since}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod dsn;
mod error;
mod locks;
mod models;
mod queries;
mod schema;
mod store;

pub use dsn::{Dsn, MEMORY_DATABASE};
pub use error::{Error, LockOperation, Result};
pub use locks::{LockBackend, LockGuard, NamedLocks};
pub use models::{StageMileage, StoredPosition, TrackSummary};
pub use queries::PositionQuery;
pub use store::{DEFAULT_BUSY_TIMEOUT, DEFAULT_LOCK_LEASE, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/gps-tracker/tracks.db`
/// - macOS: `~/Library/Application Support/gps-tracker/tracks.db`
/// - Windows: `C:\Users\<user>\AppData\Local\gps-tracker\tracks.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("gps-tracker")
        .join("tracks.db")
}
