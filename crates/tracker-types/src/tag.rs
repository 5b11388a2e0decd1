//! Calendar-day track tags.
//!
//! Every position sample belongs to exactly one daily track, identified by
//! a `YYYYMMDD` tag. The tag is derived from the sample's unix timestamp in
//! a single fixed UTC offset so that ingestion and reporting always agree
//! on where one day ends and the next begins.

use core::fmt;
use core::str::FromStr;

use time::{Date, Month, OffsetDateTime, UtcOffset};

use crate::error::ParseError;

/// Identifier of one daily track, displayed as `YYYYMMDD`.
///
/// Tags order chronologically, which matches the lexical order of their
/// string form.
///
/// ```
/// use tracker_types::DayTag;
/// use time::UtcOffset;
///
/// let tag = DayTag::from_timestamp(1_314_198_000, UtcOffset::UTC).unwrap();
/// assert_eq!(tag.to_string(), "20110824");
/// assert_eq!("20110824".parse::<DayTag>().unwrap(), tag);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct DayTag(Date);

impl DayTag {
    /// Create a tag for a calendar date.
    #[must_use]
    pub const fn new(date: Date) -> Self {
        Self(date)
    }

    /// Derive the tag of a unix timestamp as seen from `offset`.
    pub fn from_timestamp(timestamp: i64, offset: UtcOffset) -> Result<Self, ParseError> {
        let local = OffsetDateTime::from_unix_timestamp(timestamp)
            .ok()
            .and_then(|utc| utc.checked_to_offset(offset))
            .ok_or(ParseError::TimestampOutOfRange(timestamp))?;
        Ok(Self(local.date()))
    }

    /// The tag for the current day in `offset`.
    #[must_use]
    pub fn today(offset: UtcOffset) -> Self {
        Self(OffsetDateTime::now_utc().to_offset(offset).date())
    }

    /// The calendar date this tag names.
    #[must_use]
    pub const fn date(&self) -> Date {
        self.0
    }

    /// Unix timestamp of the first second of this day in `offset`.
    #[must_use]
    pub fn start_timestamp(&self, offset: UtcOffset) -> i64 {
        self.0.midnight().assume_offset(offset).unix_timestamp()
    }
}

impl fmt::Display for DayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl FromStr for DayTag {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidDayTag(s.to_string());

        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year: i32 = s[0..4].parse().map_err(|_| invalid())?;
        let month: u8 = s[4..6].parse().map_err(|_| invalid())?;
        let day: u8 = s[6..8].parse().map_err(|_| invalid())?;

        let month = Month::try_from(month).map_err(|_| invalid())?;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
        Ok(Self(date))
    }
}

impl TryFrom<String> for DayTag {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayTag> for String {
    fn from(tag: DayTag) -> Self {
        tag.to_string()
    }
}
