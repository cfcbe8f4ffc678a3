use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use ticker_dash_core::domain::recommendation::RecommendationLabel;

#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecommendation {
    pub date: NaiveDate,
    pub buy: i32,
    pub sell: i32,
    pub neutral: i32,
    pub recommendation: RecommendationLabel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

fn label_for(buy: i32, sell: i32, neutral: i32) -> RecommendationLabel {
    let total = f64::from(buy + sell + neutral);
    let net = f64::from(buy - sell) / total;
    match net {
        n if n >= 0.6 => RecommendationLabel::StrongBuy,
        n if n >= 0.2 => RecommendationLabel::Buy,
        n if n > -0.2 => RecommendationLabel::Neutral,
        n if n > -0.6 => RecommendationLabel::Sell,
        _ => RecommendationLabel::StrongSell,
    }
}

/// Deterministic demo rows for `days` trading days ending at `end` (weekends skipped).
pub fn demo_rows(
    ticker: &str,
    end: NaiveDate,
    days: usize,
) -> (Vec<SeedRecommendation>, Vec<SeedBar>) {
    let seed = ticker.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));

    let mut dates = Vec::with_capacity(days);
    let mut date = end;
    while dates.len() < days {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date = date - Duration::days(1);
    }
    dates.reverse();

    let mut recs = Vec::with_capacity(days);
    let mut bars = Vec::with_capacity(days);
    // Raw provider units: 1000 == 1.0 display currency.
    let mut close = 20_000.0 + f64::from(seed % 50) * 1_000.0;

    for (i, date) in dates.into_iter().enumerate() {
        let k = (seed as usize).wrapping_add(i * 7);
        let buy = (k % 9) as i32 + 1;
        let sell = ((k / 3) % 5) as i32;
        let neutral = ((k / 2) % 4) as i32;
        recs.push(SeedRecommendation {
            date,
            buy,
            sell,
            neutral,
            recommendation: label_for(buy, sell, neutral),
        });

        let drift = ((k % 11) as f64 - 5.0) / 100.0;
        let open = close;
        close = (close * (1.0 + drift)).max(1_000.0).round();
        bars.push(SeedBar {
            date,
            open,
            high: open.max(close) * 1.01,
            low: open.min(close) * 0.99,
            close,
            volume: ((k % 13) as f64 + 1.0) * 100_000.0,
        });
    }

    (recs, bars)
}

pub async fn seed_demo_rows(
    pool: &sqlx::PgPool,
    ticker: &str,
    end: NaiveDate,
    days: usize,
) -> anyhow::Result<u64> {
    anyhow::ensure!(
        (1..=5000).contains(&days),
        "seed days must be 1..=5000 (got {days})"
    );

    let (recs, bars) = demo_rows(ticker, end, days);
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut inserted: u64 = 0;

    for r in &recs {
        let res = sqlx::query(
            "INSERT INTO recommendations (date, stock, buy, sell, neutral, recommendation) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (stock, date) DO NOTHING",
        )
        .bind(r.date)
        .bind(ticker)
        .bind(r.buy)
        .bind(r.sell)
        .bind(r.neutral)
        .bind(r.recommendation.as_str())
        .execute(&mut *tx)
        .await
        .context("insert recommendations failed")?;
        inserted += res.rows_affected();
    }

    for b in &bars {
        let res = sqlx::query(
            "INSERT INTO history (date, stock, open, high, low, close, volume) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (stock, date) DO NOTHING",
        )
        .bind(b.date)
        .bind(ticker)
        .bind(b.open)
        .bind(b.high)
        .bind(b.low)
        .bind(b.close)
        .bind(b.volume)
        .execute(&mut *tx)
        .await
        .context("insert history failed")?;
        inserted += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}
