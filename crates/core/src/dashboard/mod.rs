pub mod render;
pub mod source;

use crate::config::{PriceSource, Settings};
use crate::domain::melt::{label_distribution, melt, ratio_series};
use crate::domain::price::{summarize, PriceBar};
use crate::domain::ratios::rate_all;
use crate::domain::recommendation::RecommendationRecord;
use crate::error::{DashboardError, Result};
use crate::remote::HttpPriceHistoryClient;
use crate::storage::{PgStore, QueryTemplates};
use crate::time::window::PriceWindow;
use chrono::{DateTime, Utc};
use render::{Panel, PricePanel, RecommendationPanel, RenderModel};
use source::{PriceHistorySource, RecommendationSource};
use std::sync::Arc;

const MAX_TICKER_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub price_lookback_days: i64,
    pub table_rows: usize,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            price_lookback_days: 365,
            table_rows: 10,
        }
    }
}

impl DashboardOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            price_lookback_days: settings.price_lookback_days,
            table_rows: settings.table_rows,
        }
    }
}

/// Trims and upper-cases user input; accepts `[A-Z0-9.-]{1,12}`.
pub fn normalize_ticker(input: &str) -> Result<String> {
    let ticker = input.trim().to_ascii_uppercase();
    if ticker.is_empty() {
        return Err(DashboardError::InvalidTicker("ticker is empty".to_string()));
    }
    if ticker.len() > MAX_TICKER_LEN {
        return Err(DashboardError::InvalidTicker(format!(
            "{ticker:?} is longer than {MAX_TICKER_LEN} characters"
        )));
    }
    if !ticker
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(DashboardError::InvalidTicker(format!(
            "{ticker:?} contains characters other than letters, digits, '.' or '-'"
        )));
    }
    Ok(ticker)
}

#[derive(Clone)]
pub struct Dashboard {
    recommendations: Arc<dyn RecommendationSource>,
    prices: Arc<dyn PriceHistorySource>,
    options: DashboardOptions,
}

impl Dashboard {
    pub fn new(
        recommendations: Arc<dyn RecommendationSource>,
        prices: Arc<dyn PriceHistorySource>,
        options: DashboardOptions,
    ) -> Self {
        Self {
            recommendations,
            prices,
            options,
        }
    }

    /// Wires the Postgres store and the configured price source around an existing pool.
    pub fn from_settings(settings: &Settings, pool: sqlx::PgPool) -> anyhow::Result<Self> {
        let templates = QueryTemplates::from_settings(settings)?;
        let store = Arc::new(PgStore::new(pool, templates));
        let prices: Arc<dyn PriceHistorySource> = match settings.price_source {
            PriceSource::Database => store.clone(),
            PriceSource::Remote => Arc::new(HttpPriceHistoryClient::from_settings(settings)?),
        };
        Ok(Self::new(
            store,
            prices,
            DashboardOptions::from_settings(settings),
        ))
    }

    pub async fn on_ticker_submitted(&self, input: &str) -> RenderModel {
        self.on_ticker_submitted_at(input, Utc::now()).await
    }

    pub async fn on_ticker_submitted_at(&self, input: &str, now: DateTime<Utc>) -> RenderModel {
        let ticker = match normalize_ticker(input) {
            Ok(t) => t,
            Err(err) => {
                tracing::info!(input, error = %err, "rejected ticker input");
                return RenderModel {
                    ticker: input.trim().to_string(),
                    generated_at: now,
                    window: None,
                    recommendations: Panel::failed(&err),
                    prices: Panel::failed(&err),
                };
            }
        };

        let window = match PriceWindow::trailing(now, self.options.price_lookback_days) {
            Ok(w) => w,
            Err(err) => {
                tracing::error!(%ticker, error = %err, "cannot build price window");
                return RenderModel {
                    ticker,
                    generated_at: now,
                    window: None,
                    recommendations: Panel::failed(&err),
                    prices: Panel::failed(&err),
                };
            }
        };

        let (recs, bars) = tokio::join!(
            self.recommendations.fetch_recommendations(&ticker),
            self.prices.fetch_price_history(&ticker, window.from, window.to),
        );

        let recommendations = match recs {
            Ok(records) => self.recommendation_panel(&ticker, records),
            Err(err) => {
                tracing::error!(%ticker, error = %err, "recommendation fetch failed");
                Panel::failed(&err)
            }
        };

        let prices = match bars {
            Ok(bars) => self.price_panel(bars),
            Err(err) => {
                tracing::error!(%ticker, source = self.prices.source_name(), error = %err, "price fetch failed");
                Panel::failed(&err)
            }
        };

        tracing::info!(
            %ticker,
            recommendations_ready = recommendations.is_ready(),
            prices_ready = prices.is_ready(),
            "rendered dashboard"
        );

        RenderModel {
            ticker,
            generated_at: now,
            window: Some(window),
            recommendations,
            prices,
        }
    }

    fn recommendation_panel(
        &self,
        ticker: &str,
        records: Vec<RecommendationRecord>,
    ) -> Panel<RecommendationPanel> {
        let (rated, skipped_rows) = rate_all(records);

        let melted = melt(&rated, ticker);
        if melted.is_empty() {
            return Panel::no_data();
        }
        let ratio_series = ratio_series(&rated, ticker);
        let label_distribution = label_distribution(&rated, ticker);

        let mut table: Vec<_> = rated
            .into_iter()
            .filter(|r| r.record.stock.eq_ignore_ascii_case(ticker))
            .collect();
        table.sort_by(|a, b| b.record.date.cmp(&a.record.date));
        table.truncate(self.options.table_rows);

        let Some(latest) = table.first().cloned() else {
            return Panel::no_data();
        };

        Panel::Ready {
            data: RecommendationPanel {
                table,
                latest,
                ratio_series,
                melted,
                label_distribution,
                skipped_rows,
            },
        }
    }

    fn price_panel(&self, mut bars: Vec<PriceBar>) -> Panel<PricePanel> {
        bars.sort_by_key(|b| b.date);
        let Some(summary) = summarize(&bars) else {
            return Panel::no_data();
        };
        let table = bars
            .iter()
            .rev()
            .take(self.options.table_rows)
            .cloned()
            .collect();
        Panel::Ready {
            data: PricePanel {
                source: self.prices.source_name(),
                bars,
                table,
                summary,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::melt::RatingKind;
    use crate::domain::recommendation::RecommendationLabel;
    use crate::error::ErrorKind;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRecommendations {
        rows: Vec<RecommendationRecord>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RecommendationSource for FakeRecommendations {
        async fn fetch_recommendations(&self, ticker: &str) -> Result<Vec<RecommendationRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DashboardError::Connection("connection refused".to_string()));
            }
            Ok(self
                .rows
                .iter()
                .filter(|r| r.stock == ticker)
                .cloned()
                .collect())
        }
    }

    struct FakePrices {
        bars: Vec<PriceBar>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl PriceHistorySource for FakePrices {
        fn source_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_price_history(
            &self,
            _ticker: &str,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<Vec<PriceBar>> {
            if self.fail {
                return Err(DashboardError::RemoteFetch("price api HTTP 502".to_string()));
            }
            Ok(self
                .bars
                .iter()
                .filter(|b| (from..=to).contains(&b.date))
                .cloned()
                .collect())
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, day).unwrap()
    }

    fn rec(day: u32, buy: u32, sell: u32, neutral: u32) -> RecommendationRecord {
        RecommendationRecord {
            date: d(day),
            stock: "ACB".to_string(),
            buy,
            sell,
            neutral,
            recommendation: RecommendationLabel::Buy,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 12, 9, 0, 0).unwrap()
    }

    fn dashboard(
        rows: Vec<RecommendationRecord>,
        bars: Vec<PriceBar>,
        fail_recs: bool,
        fail_prices: bool,
    ) -> (Dashboard, Arc<FakeRecommendations>) {
        let recs = Arc::new(FakeRecommendations {
            rows,
            fail: fail_recs,
            calls: AtomicUsize::new(0),
        });
        let prices = Arc::new(FakePrices {
            bars,
            fail: fail_prices,
        });
        let dash = Dashboard::new(
            recs.clone(),
            prices,
            DashboardOptions {
                price_lookback_days: 30,
                table_rows: 2,
            },
        );
        (dash, recs)
    }

    #[test]
    fn normalizes_tickers() {
        assert_eq!(normalize_ticker("  acb ").unwrap(), "ACB");
        assert_eq!(normalize_ticker("brk.b").unwrap(), "BRK.B");
        assert!(normalize_ticker("").is_err());
        assert!(normalize_ticker("ACB'; DROP TABLE history;--").is_err());
        assert!(normalize_ticker("ABCDEFGHIJKLM").is_err());
    }

    #[tokio::test]
    async fn renders_both_panels() {
        let bars = vec![
            PriceBar::from_raw(d(10), 158_000.0, 161_000.0, 157_000.0, 160_000.0, None),
            PriceBar::from_raw(d(9), 150_000.0, 152_000.0, 149_000.0, 150_000.0, None),
        ];
        let (dash, _) = dashboard(
            vec![rec(9, 1, 1, 2), rec(10, 6, 3, 1), rec(11, 0, 0, 0), rec(8, 2, 2, 0)],
            bars,
            false,
            false,
        );

        let model = dash.on_ticker_submitted_at("acb", now()).await;
        assert_eq!(model.ticker, "ACB");
        assert_eq!(model.window.unwrap().to, d(12));

        let recs = model.recommendations.data().expect("recommendations ready");
        assert_eq!(recs.skipped_rows, 1);
        assert_eq!(recs.melted.len(), 9);
        assert_eq!(recs.melted[0].date, d(8));
        assert_eq!(recs.melted[0].rating, RatingKind::Buy);
        assert_eq!(recs.table.len(), 2);
        assert_eq!(recs.latest.record.date, d(10));
        assert!((recs.latest.ratios.buy_prob - 0.6).abs() < 1e-12);
        assert_eq!(recs.label_distribution[&RecommendationLabel::Buy], 3);

        let prices = model.prices.data().expect("prices ready");
        assert_eq!(prices.source, "fake");
        assert_eq!(prices.bars[0].date, d(9));
        assert_eq!(prices.summary.latest_close, 160.0);
    }

    #[tokio::test]
    async fn price_table_is_latest_first_and_capped() {
        let bars = (5..=9)
            .map(|day| {
                let close = f64::from(day) * 1000.0;
                PriceBar::from_raw(d(day), close, close, close, close, None)
            })
            .collect();
        let (dash, _) = dashboard(vec![rec(10, 1, 0, 0)], bars, false, false);

        let model = dash.on_ticker_submitted_at("ACB", now()).await;
        let prices = model.prices.data().expect("prices ready");
        assert_eq!(prices.bars.len(), 5);
        let dates: Vec<_> = prices.table.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(9), d(8)]);
        assert_eq!(prices.table[0].close, 9.0);
    }

    #[tokio::test]
    async fn empty_results_render_no_data() {
        let (dash, _) = dashboard(vec![rec(10, 1, 0, 0)], vec![], false, false);
        let model = dash.on_ticker_submitted_at("VNM", now()).await;
        assert!(matches!(model.recommendations, Panel::NoData { .. }));
        assert!(matches!(model.prices, Panel::NoData { .. }));
        assert!(!model.is_rejected_input());
    }

    #[tokio::test]
    async fn only_zero_total_rows_is_no_data() {
        let (dash, _) = dashboard(vec![rec(10, 0, 0, 0)], vec![], false, false);
        let model = dash.on_ticker_submitted_at("ACB", now()).await;
        assert!(matches!(model.recommendations, Panel::NoData { .. }));
    }

    #[tokio::test]
    async fn infrastructure_errors_become_failed_panels() {
        let bars = vec![PriceBar::from_raw(d(10), 1.0, 1.0, 1.0, 1.0, None)];
        let (dash, _) = dashboard(vec![rec(10, 1, 0, 0)], bars, true, false);
        let model = dash.on_ticker_submitted_at("ACB", now()).await;
        assert_eq!(model.recommendations.error_kind(), Some(ErrorKind::Connection));
        assert!(model.prices.is_ready());

        let (dash, _) = dashboard(vec![rec(10, 1, 0, 0)], vec![], false, true);
        let model = dash.on_ticker_submitted_at("ACB", now()).await;
        assert!(model.recommendations.is_ready());
        assert_eq!(model.prices.error_kind(), Some(ErrorKind::RemoteFetch));
    }

    #[tokio::test]
    async fn invalid_input_skips_fetching() {
        let (dash, recs) = dashboard(vec![rec(10, 1, 0, 0)], vec![], false, false);
        let model = dash.on_ticker_submitted_at("   ", now()).await;
        assert!(model.is_rejected_input());
        assert_eq!(recs.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_lookback_fails_without_panicking() {
        let recs = Arc::new(FakeRecommendations {
            rows: vec![rec(10, 1, 0, 0)],
            fail: false,
            calls: AtomicUsize::new(0),
        });
        let dash = Dashboard::new(
            recs.clone(),
            Arc::new(FakePrices {
                bars: vec![],
                fail: false,
            }),
            DashboardOptions {
                price_lookback_days: 200_000_000,
                table_rows: 10,
            },
        );

        let model = dash.on_ticker_submitted_at("ACB", now()).await;
        assert!(model.window.is_none());
        assert_eq!(model.recommendations.error_kind(), Some(ErrorKind::Config));
        assert_eq!(model.prices.error_kind(), Some(ErrorKind::Config));
        assert!(!model.is_rejected_input());
        assert_eq!(recs.calls.load(Ordering::SeqCst), 0);
    }
}
