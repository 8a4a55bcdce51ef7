//! Calendar dates used as the sole index of the plan cache.
//!
//! A [`DateKey`] has exactly one canonical string form, `YYYY-MM-DD`, which is
//! also the stem of the cache file holding that date's plans. In JSON the key
//! is an object `{year, month, day}` whose `month` is zero-based (January is
//! `0`), the layout used by the plan files already on disk.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, Duration, Month};

const CANONICAL_LEN: usize = 10;
const MAX_YEAR: i32 = 9999;

/// Errors raised while building or parsing a [`DateKey`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateKeyError {
    #[error("`{input}` does not match the YYYY-MM-DD pattern")]
    Malformed { input: String },
    #[error("{year:04}-{month:02}-{day:02} is not a valid calendar date")]
    OutOfRange { year: i32, month: u8, day: u8 },
}

/// A calendar date (year, month, day-of-month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "DateSpec", into = "DateSpec")]
pub struct DateKey(Date);

impl DateKey {
    /// Build a key from a one-based month.
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, DateKeyError> {
        let out_of_range = || DateKeyError::OutOfRange { year, month, day };
        if !(0..=MAX_YEAR).contains(&year) {
            return Err(out_of_range());
        }
        let calendar_month = Month::try_from(month).map_err(|_| out_of_range())?;
        Date::from_calendar_date(year, calendar_month, day)
            .map(Self)
            .map_err(|_| out_of_range())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// One-based month (January is `1`).
    pub fn month(&self) -> u8 {
        u8::from(self.0.month())
    }

    pub fn day(&self) -> u8 {
        self.0.day()
    }

    /// The following calendar day, if it still has a four-digit year.
    pub fn next_day(&self) -> Option<Self> {
        self.0
            .next_day()
            .filter(|next| next.year() <= MAX_YEAR)
            .map(Self)
    }

    /// Whole days from `earlier` to `self`; negative when `earlier` is later.
    pub fn days_since(&self, earlier: &DateKey) -> i64 {
        let delta: Duration = self.0 - earlier.0;
        delta.whole_days()
    }

    /// Whether `input` has the fixed-width `DDDD-DD-DD` shape, without
    /// checking that it names a real calendar day.
    pub fn has_canonical_shape(input: &str) -> bool {
        let bytes = input.as_bytes();
        bytes.len() == CANONICAL_LEN
            && bytes.iter().enumerate().all(|(index, byte)| match index {
                4 | 7 => *byte == b'-',
                _ => byte.is_ascii_digit(),
            })
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}

impl FromStr for DateKey {
    type Err = DateKeyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if !DateKey::has_canonical_shape(input) {
            return Err(DateKeyError::Malformed {
                input: input.to_string(),
            });
        }
        let malformed = || DateKeyError::Malformed {
            input: input.to_string(),
        };
        let year = input[0..4].parse::<i32>().map_err(|_| malformed())?;
        let month = input[5..7].parse::<u8>().map_err(|_| malformed())?;
        let day = input[8..10].parse::<u8>().map_err(|_| malformed())?;
        DateKey::new(year, month, day)
    }
}

impl From<DateKey> for Date {
    fn from(key: DateKey) -> Self {
        key.0
    }
}

/// JSON shape of a [`DateKey`], with a zero-based month.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DateSpec {
    year: i32,
    month: u8,
    day: u8,
}

impl TryFrom<DateSpec> for DateKey {
    type Error = DateKeyError;

    fn try_from(spec: DateSpec) -> Result<Self, Self::Error> {
        let month = spec.month.checked_add(1).ok_or(DateKeyError::OutOfRange {
            year: spec.year,
            month: spec.month,
            day: spec.day,
        })?;
        DateKey::new(spec.year, month, spec.day)
    }
}

impl From<DateKey> for DateSpec {
    fn from(key: DateKey) -> Self {
        Self {
            year: key.year(),
            month: key.month() - 1,
            day: key.day(),
        }
    }
}
