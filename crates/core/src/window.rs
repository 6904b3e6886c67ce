use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};

/// Length of the calendar-week quota window.
pub const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Identifier of the ISO week containing `now`, formatted `YYYY-Www`.
///
/// Uses the ISO week-numbering year, so the last days of December can belong
/// to week 1 of the following year. All instances agree on the boundary
/// because it is derived from UTC.
#[must_use]
pub fn iso_week_id(now: &DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
