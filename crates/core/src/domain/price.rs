use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Providers quote prices in thousandths of the display currency unit.
pub const PRICE_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl PriceBar {
    /// Builds a bar from raw provider units.
    pub fn from_raw(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Self {
        Self {
            date,
            open: open / PRICE_SCALE,
            high: high / PRICE_SCALE,
            low: low / PRICE_SCALE,
            close: close / PRICE_SCALE,
            volume,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub latest_close: f64,
    pub period_high: f64,
    pub period_low: f64,
    /// Percent change from the first close to the last; `None` when the first close is zero.
    pub change_pct: Option<f64>,
}

/// Expects `bars` sorted by date ascending.
pub fn summarize(bars: &[PriceBar]) -> Option<PriceSummary> {
    let first = bars.first()?;
    let last = bars.last()?;
    let period_high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let period_low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let change_pct = (first.close != 0.0).then(|| (last.close - first.close) / first.close * 100.0);

    Some(PriceSummary {
        first_date: first.date,
        last_date: last.date,
        latest_close: last.close,
        period_high,
        period_low,
        change_pct,
    })
}
