use crate::error::{DashboardError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

const SECS_PER_DAY: i64 = 86_400;

/// Inclusive calendar-date window for price history, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl PriceWindow {
    pub fn trailing(now_utc: DateTime<Utc>, lookback_days: i64) -> Result<Self> {
        let to = now_utc.date_naive();
        let from = Duration::try_days(lookback_days)
            .filter(|d| *d >= Duration::zero())
            .and_then(|d| to.checked_sub_signed(d))
            .ok_or_else(|| {
                DashboardError::Config(format!(
                    "price lookback of {lookback_days} days does not fit before {to}"
                ))
            })?;
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.from..=self.to).contains(&date)
    }

    /// Unix-time bounds covering every second of both end dates.
    pub fn unix_bounds(&self) -> (i64, i64) {
        (
            date_to_unix(self.from),
            date_to_unix(self.to) + SECS_PER_DAY - 1,
        )
    }
}

pub fn date_to_unix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

pub fn unix_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}
