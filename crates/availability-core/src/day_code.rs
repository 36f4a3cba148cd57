//! Day-granularity time codec.
//!
//! Calendar instants are stored and compared as a count of whole days since
//! `0001-01-01` (proleptic Gregorian, UTC day boundary). Time of day is not
//! preserved and no timezone conversion happens: the UTC calendar date of the
//! instant is what gets encoded.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Whole days elapsed since `0001-01-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayCode(pub i32);

impl DayCode {
    /// Encodes a calendar date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        // chrono counts 0001-01-01 as day 1.
        Self(date.num_days_from_ce() - 1)
    }

    /// Decodes to a calendar date.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the code lies outside the
    /// representable date range.
    pub fn to_date(self) -> Result<NaiveDate, DomainError> {
        self.0
            .checked_add(1)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| DomainError::Validation(format!("day code {} is out of range", self.0)))
    }
}

impl fmt::Display for DayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encodes an instant as its day code, discarding the time of day.
#[must_use]
pub fn to_day_code(instant: DateTime<Utc>) -> DayCode {
    DayCode::from_date(instant.date_naive())
}

/// Decodes a day code to midnight UTC of that day.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the code lies outside the
/// representable date range.
pub fn from_day_code(code: DayCode) -> Result<DateTime<Utc>, DomainError> {
    Ok(code.to_date()?.and_time(NaiveTime::MIN).and_utc())
}
