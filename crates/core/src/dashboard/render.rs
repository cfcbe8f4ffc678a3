use crate::domain::melt::{MeltedRating, RatioPoint};
use crate::domain::price::{PriceBar, PriceSummary};
use crate::domain::ratios::RatedRecommendation;
use crate::domain::recommendation::RecommendationLabel;
use crate::error::{DashboardError, ErrorKind};
use crate::time::window::PriceWindow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const NO_DATA_MESSAGE: &str = "no data for this ticker";

/// State of one dashboard section after a render pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Panel<T> {
    Ready { data: T },
    NoData { message: String },
    Failed { kind: ErrorKind, message: String },
}

impl<T> Panel<T> {
    pub fn no_data() -> Self {
        Self::NoData {
            message: NO_DATA_MESSAGE.to_string(),
        }
    }

    pub fn failed(err: &DashboardError) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ready { data } => Some(data),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationPanel {
    /// Newest first, capped at the configured table size.
    pub table: Vec<RatedRecommendation>,
    pub latest: RatedRecommendation,
    pub ratio_series: Vec<RatioPoint>,
    pub melted: Vec<MeltedRating>,
    pub label_distribution: BTreeMap<RecommendationLabel, usize>,
    /// Rows dropped because buy + sell + neutral was zero.
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricePanel {
    pub source: &'static str,
    pub bars: Vec<PriceBar>,
    /// Newest first, capped at the configured table size.
    pub table: Vec<PriceBar>,
    pub summary: PriceSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderModel {
    pub ticker: String,
    pub generated_at: DateTime<Utc>,
    /// `None` only when the configured lookback could not produce a window.
    pub window: Option<PriceWindow>,
    pub recommendations: Panel<RecommendationPanel>,
    pub prices: Panel<PricePanel>,
}

impl RenderModel {
    /// The submitted ticker was rejected before any fetch ran.
    pub fn is_rejected_input(&self) -> bool {
        let invalid = |kind: Option<ErrorKind>| kind == Some(ErrorKind::InvalidTicker);
        invalid(self.recommendations.error_kind()) && invalid(self.prices.error_kind())
    }
}
