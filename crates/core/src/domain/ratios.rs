use crate::domain::recommendation::RecommendationRecord;
use crate::error::{DashboardError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedRatios {
    pub buy_prob: f64,
    pub neutral_prob: f64,
    pub sell_prob: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedRecommendation {
    #[serde(flatten)]
    pub record: RecommendationRecord,
    #[serde(flatten)]
    pub ratios: DerivedRatios,
}

pub fn compute_ratios(record: &RecommendationRecord) -> Result<DerivedRatios> {
    let total = record.total();
    if total == 0 {
        return Err(DashboardError::DivisionByZero {
            stock: record.stock.clone(),
            date: record.date,
        });
    }

    let total = total as f64;
    Ok(DerivedRatios {
        buy_prob: f64::from(record.buy) / total,
        neutral_prob: f64::from(record.neutral) / total,
        sell_prob: f64::from(record.sell) / total,
    })
}

/// Pairs every record with its ratios. Rows whose counts sum to zero are dropped; the
/// second value is how many were dropped.
pub fn rate_all(records: Vec<RecommendationRecord>) -> (Vec<RatedRecommendation>, usize) {
    let mut out = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        match compute_ratios(&record) {
            Ok(ratios) => out.push(RatedRecommendation { record, ratios }),
            Err(err) => {
                skipped += 1;
                tracing::warn!(error = %err, "skipping recommendation row");
            }
        }
    }
    (out, skipped)
}
