//! KML rendering of daily tracks.
//!
//! A track renders as one `Placemark` inside a `Folder`, identified by its
//! day tag and drawn as a `LineString` of `longitude, latitude` pairs.

use tracker_types::{Coordinate, DayTag};

use crate::error::ExportError;

/// KML namespace written on the root element.
pub const KML_NAMESPACE: &str = "http://earth.google.com/kml/2.1";

/// File name of a track export, `<tag>.kml`.
#[must_use]
pub fn file_name(tag: &DayTag) -> String {
    format!("{tag}.kml")
}

/// Render a track's points as a KML document.
///
/// Points are drawn in the order given, which should be ascending time.
/// Returns [`ExportError::EmptyTrack`] when there are no points.
///
/// ```
/// use tracker_core::kml::render_track;
/// use tracker_types::{Coordinate, DayTag};
///
/// let tag: DayTag = "20110824".parse()?;
/// let kml = render_track(&tag, &[Coordinate::new(51.5, -0.1), Coordinate::new(51.6, -0.1)])?;
/// assert!(kml.contains("<coordinates>-0.1, 51.5 -0.1, 51.6</coordinates>"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn render_track(tag: &DayTag, points: &[Coordinate]) -> Result<String, ExportError> {
    if points.is_empty() {
        return Err(ExportError::EmptyTrack(*tag));
    }

    let coordinates = points
        .iter()
        .map(|p| format!("{}, {}", p.longitude, p.latitude))
        .collect::<Vec<_>>()
        .join(" ");

    let date = tag.date();
    let description = format!(
        "This is track done on {:02}/{:02}/{}",
        date.day(),
        u8::from(date.month()),
        date.year()
    );

    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="{KML_NAMESPACE}">
  <Folder>
    <Placemark id="{tag}">
      <name>Path ({tag})</name>
      <description>{description}</description>
      <LineString>
        <coordinates>{coordinates}</coordinates>
      </LineString>
    </Placemark>
  </Folder>
</kml>
"#
    ))
}
