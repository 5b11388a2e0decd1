//! Core logic for the GPS tracker.
//!
//! This crate holds the pieces of the tracker that need neither a database
//! nor a runtime configuration:
//!
//! - [`geo`]: haversine distance and unit conversion factors
//! - [`DataSource`]: the seam between the ingestion pipeline and the remote
//!   tracking service, with an HTTP implementation ([`TrackingClient`],
//!   behind the `tracking-client` feature) and a [`MockSource`] for tests
//! - [`kml`]: rendering of daily tracks as KML documents
//!
//! # Example
//!
//! ```
//! use tracker_core::geo::{KM_TO_MILES, distance_km, km_to_whole_miles};
//! use tracker_types::Coordinate;
//!
//! let a = Coordinate::new(51.5, -0.1);
//! let b = Coordinate::new(51.6, -0.1);
//! let km = distance_km(a, b) + distance_km(b, a);
//! assert_eq!(km_to_whole_miles(km, KM_TO_MILES), 14);
//! ```

pub mod error;
pub mod geo;
pub mod kml;
pub mod mock;
pub mod source;

#[cfg(feature = "tracking-client")]
pub mod client;

pub use error::{ExportError, SourceError, SourceResult};
pub use mock::MockSource;
pub use source::{DataSource, PositionBatch};

#[cfg(feature = "tracking-client")]
pub use client::TrackingClient;
