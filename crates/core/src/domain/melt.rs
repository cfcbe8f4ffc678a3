use crate::domain::ratios::RatedRecommendation;
use crate::domain::recommendation::RecommendationLabel;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Display rating of one unpivoted ratio column. Declaration order is the chart stack order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RatingKind {
    Buy,
    Neutral,
    Sell,
}

impl RatingKind {
    pub const ORDER: [RatingKind; 3] = [Self::Buy, Self::Neutral, Self::Sell];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeltedRating {
    pub stock: String,
    pub date: NaiveDate,
    pub rating: RatingKind,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioPoint {
    pub date: NaiveDate,
    pub buy_prob: f64,
    pub neutral_prob: f64,
    pub sell_prob: f64,
}

fn matches_ticker(rec: &RatedRecommendation, ticker: &str) -> bool {
    rec.record.stock.trim().eq_ignore_ascii_case(ticker.trim())
}

fn filtered_by_date<'a>(
    records: &'a [RatedRecommendation],
    ticker_filter: &str,
) -> Vec<&'a RatedRecommendation> {
    let mut rows: Vec<_> = records
        .iter()
        .filter(|r| matches_ticker(r, ticker_filter))
        .collect();
    // sort_by_key is stable: equal dates keep input order.
    rows.sort_by_key(|r| r.record.date);
    rows
}

pub fn melt(records: &[RatedRecommendation], ticker_filter: &str) -> Vec<MeltedRating> {
    let rows = filtered_by_date(records, ticker_filter);
    let mut out = Vec::with_capacity(rows.len() * RatingKind::ORDER.len());
    for rec in rows {
        for kind in RatingKind::ORDER {
            let percentage = match kind {
                RatingKind::Buy => rec.ratios.buy_prob,
                RatingKind::Neutral => rec.ratios.neutral_prob,
                RatingKind::Sell => rec.ratios.sell_prob,
            };
            out.push(MeltedRating {
                stock: rec.record.stock.clone(),
                date: rec.record.date,
                rating: kind,
                percentage,
            });
        }
    }
    out
}

/// Wide form of the ratios, one point per record, for the line chart.
pub fn ratio_series(records: &[RatedRecommendation], ticker_filter: &str) -> Vec<RatioPoint> {
    filtered_by_date(records, ticker_filter)
        .into_iter()
        .map(|r| RatioPoint {
            date: r.record.date,
            buy_prob: r.ratios.buy_prob,
            neutral_prob: r.ratios.neutral_prob,
            sell_prob: r.ratios.sell_prob,
        })
        .collect()
}

pub fn label_distribution(
    records: &[RatedRecommendation],
    ticker_filter: &str,
) -> BTreeMap<RecommendationLabel, usize> {
    let mut out: BTreeMap<RecommendationLabel, usize> =
        RecommendationLabel::ALL.into_iter().map(|l| (l, 0)).collect();
    for rec in records.iter().filter(|r| matches_ticker(r, ticker_filter)) {
        *out.entry(rec.record.recommendation).or_default() += 1;
    }
    out
}
