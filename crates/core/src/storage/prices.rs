use crate::domain::contract::PriceRow;
use crate::domain::price::PriceBar;
use crate::error::Result;
use chrono::NaiveDate;

pub async fn fetch_price_history(
    pool: &sqlx::PgPool,
    query: &str,
    ticker: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<PriceBar>> {
    let t0 = std::time::Instant::now();

    let mut conn = pool.acquire().await?;
    let rows = sqlx::query_as::<_, PriceRow>(query)
        .persistent(false)
        .bind(ticker)
        .fetch_all(&mut *conn)
        .await?;
    drop(conn);

    let total = rows.len();
    let out = window_bars(rows, from, to);

    tracing::debug!(
        %ticker,
        %from,
        %to,
        rows = total,
        in_window = out.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "fetched price history"
    );
    Ok(out)
}

fn window_bars(rows: Vec<PriceRow>, from: NaiveDate, to: NaiveDate) -> Vec<PriceBar> {
    let mut out: Vec<PriceBar> = rows
        .into_iter()
        .filter(|r| (from..=to).contains(&r.date))
        .map(PriceRow::into_bar)
        .collect();
    out.sort_by_key(|b| b.date);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, close: f64) -> PriceRow {
        PriceRow {
            date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: Some(100.0),
        }
    }

    #[test]
    fn keeps_window_and_sorts_ascending() {
        let from = NaiveDate::from_ymd_opt(2024, 10, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 10, 4).unwrap();
        let bars = window_bars(
            vec![row(5, 5000.0), row(4, 4000.0), row(1, 1000.0), row(2, 2000.0)],
            from,
            to,
        );
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![2.0, 4.0]);
    }
}
