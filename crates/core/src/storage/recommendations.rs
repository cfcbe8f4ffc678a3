use crate::domain::contract::RecommendationRow;
use crate::domain::recommendation::RecommendationRecord;
use crate::error::Result;

pub async fn fetch_recommendations(
    pool: &sqlx::PgPool,
    query: &str,
    ticker: &str,
) -> Result<Vec<RecommendationRecord>> {
    let t0 = std::time::Instant::now();

    // Returned to the pool when `conn` drops, on success and error alike.
    let mut conn = pool.acquire().await?;
    let rows = sqlx::query_as::<_, RecommendationRow>(query)
        .persistent(false)
        .bind(ticker)
        .fetch_all(&mut *conn)
        .await?;
    drop(conn);

    let out = rows
        .into_iter()
        .map(RecommendationRow::validate_and_into_record)
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        %ticker,
        rows = out.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "fetched recommendations"
    );
    Ok(out)
}
