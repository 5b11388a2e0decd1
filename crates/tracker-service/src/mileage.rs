//! Mileage reports.
//!
//! Completed days count with their settled mileage; the current day counts
//! with the live sum of its stored distances.

use serde::Serialize;
use time::UtcOffset;
use tracing::{debug, info};

use tracker_core::geo::km_to_whole_miles;
use tracker_store::{Result, Store};
use tracker_types::DayTag;

/// Mileage queries over one store handle.
pub struct MileageAggregator<'a> {
    store: &'a Store,
    km_to_miles: f64,
    utc_offset: UtcOffset,
}

/// Outcome of settling a day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub tag: DayTag,
    pub mileage: f64,
    /// `false` when the day had already been settled.
    pub recorded: bool,
}

impl<'a> MileageAggregator<'a> {
    /// Create an aggregator using `km_to_miles` and day boundaries in `utc_offset`.
    pub fn new(store: &'a Store, km_to_miles: f64, utc_offset: UtcOffset) -> Self {
        Self {
            store,
            km_to_miles,
            utc_offset,
        }
    }

    /// Whole miles covered by one day's track. Zero when it has no rows.
    pub fn miles_for_tag(&self, tag: &DayTag) -> Result<i64> {
        let km = self.store.sum_distance(tag)?;
        let miles = km_to_whole_miles(km, self.km_to_miles);
        debug!("Track {}: {:.3} km, {} mi", tag, km, miles);
        Ok(miles)
    }

    /// Whole miles covered today.
    pub fn miles_today(&self) -> Result<i64> {
        self.miles_for_tag(&DayTag::today(self.utc_offset))
    }

    /// Settled mileage of every day before `today` plus today's live miles.
    pub fn total_miles_as_of(&self, today: &DayTag) -> Result<i64> {
        let settled = self.store.settled_mileage_before(today)?;
        let live = self.miles_for_tag(today)?;
        Ok((settled + live as f64).round() as i64)
    }

    /// Total miles up to and including today.
    pub fn total_miles_to_date(&self) -> Result<i64> {
        self.total_miles_as_of(&DayTag::today(self.utc_offset))
    }

    /// Record the mileage of a completed day.
    ///
    /// Without an explicit figure the day's stored distance is converted.
    /// A day is settled once; later attempts leave the ledger unchanged.
    pub fn settle(&self, tag: &DayTag, mileage: Option<f64>) -> Result<Settlement> {
        let mileage = match mileage {
            Some(miles) => miles,
            None => self.store.sum_distance(tag)? * self.km_to_miles,
        };

        let recorded = self.store.settle_stage(tag, mileage)?;
        if recorded {
            info!("Settled {} at {:.2} mi", tag, mileage);
        }

        Ok(Settlement {
            tag: *tag,
            mileage,
            recorded,
        })
    }
}
