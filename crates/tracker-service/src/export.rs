//! KML export of stored tracks.
//!
//! Completed days are written once: an existing file for a past day is left
//! alone. The current day's file is rewritten on every export since its
//! track is still growing.

use std::path::{Path, PathBuf};

use serde::Serialize;
use time::UtcOffset;
use tracing::{debug, info};

use tracker_core::ExportError;
use tracker_core::kml;
use tracker_store::Store;
use tracker_types::DayTag;

/// Errors raised by the exporter.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("Store error: {0}")]
    Store(#[from] tracker_store::Error),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Files written and skipped by one export pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<DayTag>,
}

/// Writes `<tag>.kml` files into a directory.
pub struct Exporter<'a> {
    store: &'a Store,
    dir: PathBuf,
    utc_offset: UtcOffset,
}

impl<'a> Exporter<'a> {
    /// Create an exporter writing into `dir`.
    pub fn new(store: &'a Store, dir: impl Into<PathBuf>, utc_offset: UtcOffset) -> Self {
        Self {
            store,
            dir: dir.into(),
            utc_offset,
        }
    }

    /// Directory files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a track is exported to.
    pub fn path_for(&self, tag: &DayTag) -> PathBuf {
        self.dir.join(kml::file_name(tag))
    }

    /// Render and write one track, replacing any existing file.
    pub fn export_tag(&self, tag: &DayTag) -> Result<PathBuf, ExporterError> {
        let points = self.store.track_points(tag)?;
        let document = kml::render_track(tag, &points)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| ExportError::Write {
            path: self.dir.clone(),
            source: e,
        })?;

        let path = self.path_for(tag);
        std::fs::write(&path, document).map_err(|e| ExportError::Write {
            path: path.clone(),
            source: e,
        })?;

        debug!("Wrote {} points to {}", points.len(), path.display());
        Ok(path)
    }

    /// Export every stored track.
    pub fn export_all(&self) -> Result<ExportSummary, ExporterError> {
        self.export_all_as_of(&DayTag::today(self.utc_offset))
    }

    /// Export every stored track, treating `today` as the current day.
    pub fn export_all_as_of(&self, today: &DayTag) -> Result<ExportSummary, ExporterError> {
        let mut summary = ExportSummary::default();

        for tag in self.store.track_tags()? {
            if tag != *today && self.path_for(&tag).exists() {
                summary.skipped.push(tag);
                continue;
            }
            summary.written.push(self.export_tag(&tag)?);
        }

        info!(
            "Exported {} track(s) to {}, {} already up to date",
            summary.written.len(),
            self.dir.display(),
            summary.skipped.len()
        );
        Ok(summary)
    }
}
