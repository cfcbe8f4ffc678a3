use crate::domain::price::PriceBar;
use crate::domain::recommendation::RecommendationRecord;
use crate::error::Result;
use chrono::NaiveDate;

#[async_trait::async_trait]
pub trait RecommendationSource: Send + Sync {
    /// Rows for `ticker` in any order. No rows is `Ok(vec![])`, never an error.
    async fn fetch_recommendations(&self, ticker: &str) -> Result<Vec<RecommendationRecord>>;
}

#[async_trait::async_trait]
pub trait PriceHistorySource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Bars within `from..=to`, sorted by date ascending.
    async fn fetch_price_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>>;
}
