use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::domain::date::{DateKey, DateKeyError};

/// The calendar date at `now` as observed in `tz`.
pub fn localized_date(now: DateTime<Utc>, tz: Tz) -> Result<DateKey, DateKeyError> {
    let local = now.with_timezone(&tz);
    // chrono guarantees 1..=12 and 1..=31
    DateKey::new(local.year(), local.month() as u8, local.day() as u8)
}

/// Today's date in `tz`.
pub fn today_in(tz: Tz) -> Result<DateKey, DateKeyError> {
    localized_date(Utc::now(), tz)
}
