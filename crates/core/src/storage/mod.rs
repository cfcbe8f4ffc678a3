pub mod prices;
pub mod recommendations;

use crate::config::Settings;
use crate::dashboard::source::{PriceHistorySource, RecommendationSource};
use crate::domain::price::PriceBar;
use crate::domain::recommendation::RecommendationRecord;
use crate::error::{DashboardError, Result};
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::collections::BTreeSet;
use std::time::Duration;

pub const DEFAULT_RECOMMENDATIONS_QUERY: &str = "SELECT date, stock, \
     buy::int8 AS buy, sell::int8 AS sell, neutral::int8 AS neutral, recommendation \
     FROM recommendations \
     WHERE stock = $1 \
     ORDER BY date DESC";

pub const DEFAULT_PRICE_HISTORY_QUERY: &str = "SELECT date, \
     open::float8 AS open, high::float8 AS high, low::float8 AS low, close::float8 AS close, \
     volume::float8 AS volume \
     FROM history \
     WHERE stock = $1 \
     ORDER BY date ASC";

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

pub fn connect_options(settings: &Settings) -> anyhow::Result<PgConnectOptions> {
    if let Some(url) = settings.database_url.as_deref() {
        return url
            .parse::<PgConnectOptions>()
            .context("DATABASE_URL is not a valid Postgres URL");
    }

    let p = &settings.db_params;
    anyhow::ensure!(
        p.is_configured(),
        "DATABASE_URL or PGHOST/PGDATABASE is required"
    );

    let mut opts = PgConnectOptions::new();
    if let Some(host) = p.host.as_deref() {
        opts = opts.host(host);
    }
    if let Some(port) = p.port {
        opts = opts.port(port);
    }
    if let Some(user) = p.user.as_deref() {
        opts = opts.username(user);
    }
    if let Some(password) = p.password.as_deref() {
        opts = opts.password(password);
    }
    if let Some(dbname) = p.dbname.as_deref() {
        opts = opts.database(dbname);
    }
    if let Some(mode) = p.sslmode.as_deref() {
        let mode = mode
            .parse::<PgSslMode>()
            .with_context(|| format!("invalid PGSSLMODE: {mode}"))?;
        opts = opts.ssl_mode(mode);
    }
    Ok(opts)
}

pub fn pool_options(settings: &Settings) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(settings.pool_min)
        .max_connections(settings.pool_max)
        .acquire_timeout(Duration::from_secs(10))
}

/// Connects eagerly; when the database is unreachable, falls back to a lazy pool so callers
/// can start degraded and surface connection errors per request.
pub async fn connect_or_lazy(settings: &Settings) -> anyhow::Result<(sqlx::PgPool, bool)> {
    let opts = connect_options(settings)?;
    match pool_options(settings).connect_with(opts.clone()).await {
        Ok(pool) => Ok((pool, true)),
        Err(e) => {
            tracing::error!(error = %e, "db connect failed; continuing with lazy pool");
            Ok((pool_options(settings).connect_lazy_with(opts), false))
        }
    }
}

/// The two parameterized SQL templates. Each must take the ticker as `$1` and nothing else.
#[derive(Debug, Clone)]
pub struct QueryTemplates {
    pub recommendations: String,
    pub price_history: String,
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self {
            recommendations: DEFAULT_RECOMMENDATIONS_QUERY.to_string(),
            price_history: DEFAULT_PRICE_HISTORY_QUERY.to_string(),
        }
    }
}

impl QueryTemplates {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let defaults = Self::default();
        let out = Self {
            recommendations: settings
                .recommendations_query
                .clone()
                .unwrap_or(defaults.recommendations),
            price_history: settings
                .price_history_query
                .clone()
                .unwrap_or(defaults.price_history),
        };
        check_single_ticker_param("RECOMMENDATIONS_QUERY", &out.recommendations)?;
        check_single_ticker_param("PRICE_HISTORY_QUERY", &out.price_history)?;
        Ok(out)
    }
}

fn placeholders(sql: &str) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        if let Ok(n) = digits.parse::<u32>() {
            out.insert(n);
        }
    }
    out
}

fn check_single_ticker_param(name: &str, sql: &str) -> Result<()> {
    let found = placeholders(sql);
    if found != BTreeSet::from([1]) {
        return Err(DashboardError::Config(format!(
            "{name} must use exactly one parameter ($1 = ticker), found {found:?}"
        )));
    }
    Ok(())
}

/// Postgres-backed query executor. The pool is injected; each call holds one pooled
/// connection for the duration of its query.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
    templates: QueryTemplates,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool, templates: QueryTemplates) -> Self {
        Self { pool, templates }
    }
}

#[async_trait::async_trait]
impl RecommendationSource for PgStore {
    async fn fetch_recommendations(&self, ticker: &str) -> Result<Vec<RecommendationRecord>> {
        recommendations::fetch_recommendations(&self.pool, &self.templates.recommendations, ticker)
            .await
    }
}

#[async_trait::async_trait]
impl PriceHistorySource for PgStore {
    fn source_name(&self) -> &'static str {
        "database"
    }

    async fn fetch_price_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        prices::fetch_price_history(&self.pool, &self.templates.price_history, ticker, from, to)
            .await
    }
}
