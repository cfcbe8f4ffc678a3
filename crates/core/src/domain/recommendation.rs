use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationLabel {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl RecommendationLabel {
    pub const ALL: [RecommendationLabel; 5] = [
        Self::StrongBuy,
        Self::Buy,
        Self::Neutral,
        Self::Sell,
        Self::StrongSell,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Neutral => "NEUTRAL",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        }
    }
}

impl fmt::Display for RecommendationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecommendationLabel {
    type Err = String;

    // Providers are inconsistent about separators ("STRONG BUY", "strong-buy").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == norm)
            .ok_or_else(|| format!("unknown recommendation label: {s:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub date: NaiveDate,
    pub stock: String,
    pub buy: u32,
    pub sell: u32,
    pub neutral: u32,
    pub recommendation: RecommendationLabel,
}

impl RecommendationRecord {
    pub fn total(&self) -> u64 {
        u64::from(self.buy) + u64::from(self.sell) + u64::from(self.neutral)
    }
}
