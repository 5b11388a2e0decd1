//! Scheduled GPS position ingestion, mileage reports and KML export.
//!
//! This crate ties the store and the tracking-service client together:
//! - Pulls new fixes from the tracking service into daily tracks
//! - Serializes overlapping runs with a named lock in the store
//! - Reports miles done today and to date, and the last known location
//! - Writes each daily track as a KML file
//!
//! # Configuration
//!
//! The tracker reads configuration from `~/.config/gps-tracker/tracker.toml`:
//!
//! ```toml
//! [storage]
//! dsn = "localhost|tracker||/var/lib/gps-tracker/tracks.db"
//!
//! [source]
//! base_url = "http://www.instamapper.com/api"
//! api_key = "your-api-key"
//! batch_size = 10
//!
//! [tracking]
//! start_date = "2011-08-24 15:00"
//! utc_offset = "+00:00"
//!
//! [ingest]
//! lock_name = "ingestion"
//! lock_timeout_secs = 10
//! interval_secs = 60
//!
//! [export]
//! dir = "/var/www/kml"
//! ```

pub mod config;
pub mod export;
pub mod ingest;
pub mod location;
pub mod mileage;
pub mod scheduler;

pub use config::{
    Config, ConfigError, ExportConfig, IngestConfig, LockSettings, Settings, SourceConfig,
    StorageConfig, TrackingConfig, UnitsConfig, ValidationError,
};
pub use export::{ExportSummary, Exporter, ExporterError};
pub use ingest::{IngestError, IngestOptions, IngestReport, Pipeline, RunOutcome};
pub use location::{LastLocation, last_location};
pub use mileage::{MileageAggregator, Settlement};
pub use scheduler::{RunStats, Scheduler};
