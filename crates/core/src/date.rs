//! Business date: the authoritative "as of" date for batch runs.
//!
//! Jobs never read the wall clock to decide what a day is. The caller (a
//! scheduler, an operator, a test) supplies the business date so that runs
//! are replayable and back-dated corrections produce the same result.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessDate(NaiveDate);

impl BusinessDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DomainError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| DomainError::invalid_date(format!("{year:04}-{month:02}-{day:02}")))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Whole days elapsed from `earlier` to this business date.
    ///
    /// Negative when `earlier` lies in the future relative to this date.
    pub fn days_since(&self, earlier: NaiveDate) -> i64 {
        (self.0 - earlier).num_days()
    }
}

impl From<NaiveDate> for BusinessDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for BusinessDate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for BusinessDate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|e| DomainError::invalid_date(format!("{s}: {e}")))
    }
}
