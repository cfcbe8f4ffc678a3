//! Row shapes returned by the configurable query templates.
//!
//! Columns are matched by name, so templates may select them in any order. Counts must
//! decode as `int8` and prices as `float8`; the built-in templates cast explicitly.

use crate::domain::price::PriceBar;
use crate::domain::recommendation::{RecommendationLabel, RecommendationRecord};
use crate::error::{DashboardError, Result};
use chrono::NaiveDate;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecommendationRow {
    pub date: NaiveDate,
    pub stock: String,
    pub buy: i64,
    pub sell: i64,
    pub neutral: i64,
    pub recommendation: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[sqlx(default)]
    pub volume: Option<f64>,
}

fn count(name: &str, v: i64, stock: &str, date: NaiveDate) -> Result<u32> {
    u32::try_from(v).map_err(|_| {
        DashboardError::Query(format!(
            "{name} count out of range for {stock} on {date}: {v}"
        ))
    })
}

impl RecommendationRow {
    pub fn validate_and_into_record(self) -> Result<RecommendationRecord> {
        let stock = self.stock.trim().to_string();
        if stock.is_empty() {
            return Err(DashboardError::Query(format!(
                "empty stock column on {}",
                self.date
            )));
        }

        let recommendation = self
            .recommendation
            .parse::<RecommendationLabel>()
            .map_err(DashboardError::Query)?;

        Ok(RecommendationRecord {
            date: self.date,
            buy: count("buy", self.buy, &stock, self.date)?,
            sell: count("sell", self.sell, &stock, self.date)?,
            neutral: count("neutral", self.neutral, &stock, self.date)?,
            stock,
            recommendation,
        })
    }
}

impl PriceRow {
    pub fn into_bar(self) -> PriceBar {
        PriceBar::from_raw(
            self.date, self.open, self.high, self.low, self.close, self.volume,
        )
    }
}
