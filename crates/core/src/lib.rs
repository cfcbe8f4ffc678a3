pub mod dashboard;
pub mod domain;
pub mod error;
pub mod remote;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    pub const MAX_POOL_SIZE: u32 = 20;
    pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PriceSource {
        Database,
        Remote,
    }

    impl std::str::FromStr for PriceSource {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> anyhow::Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "database" | "db" => Ok(Self::Database),
                "remote" | "http" => Ok(Self::Remote),
                other => anyhow::bail!("PRICE_SOURCE must be `database` or `remote` (got {other:?})"),
            }
        }
    }

    /// Discrete Postgres connection parameters, used when `DATABASE_URL` is absent.
    #[derive(Debug, Clone, Default)]
    pub struct DbParams {
        pub host: Option<String>,
        pub port: Option<u16>,
        pub user: Option<String>,
        pub password: Option<String>,
        pub dbname: Option<String>,
        pub sslmode: Option<String>,
    }

    impl DbParams {
        fn from_env() -> anyhow::Result<Self> {
            let port = match std::env::var("PGPORT").ok() {
                Some(s) => Some(s.parse::<u16>().with_context(|| format!("invalid PGPORT: {s}"))?),
                None => None,
            };
            Ok(Self {
                host: std::env::var("PGHOST").ok(),
                port,
                user: std::env::var("PGUSER").ok(),
                password: std::env::var("PGPASSWORD").ok(),
                dbname: std::env::var("PGDATABASE").ok(),
                sslmode: std::env::var("PGSSLMODE").ok(),
            })
        }

        pub fn is_configured(&self) -> bool {
            self.host.is_some() && self.dbname.is_some()
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub db_params: DbParams,
        pub pool_min: u32,
        pub pool_max: u32,
        pub recommendations_query: Option<String>,
        pub price_history_query: Option<String>,
        pub price_source: PriceSource,
        pub price_api_base_url: Option<String>,
        pub price_api_path: Option<String>,
        pub price_api_headers_file: Option<PathBuf>,
        pub price_api_timeout_secs: Option<u64>,
        pub price_api_retries: Option<u32>,
        pub price_lookback_days: i64,
        pub table_rows: usize,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let price_source = match std::env::var("PRICE_SOURCE") {
                Ok(s) => s.parse()?,
                Err(_) => PriceSource::Database,
            };

            let settings = Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                db_params: DbParams::from_env()?,
                pool_min: env_parse("DB_POOL_MIN")?.unwrap_or(1),
                pool_max: env_parse("DB_POOL_MAX")?.unwrap_or(MAX_POOL_SIZE),
                recommendations_query: non_empty_env("RECOMMENDATIONS_QUERY"),
                price_history_query: non_empty_env("PRICE_HISTORY_QUERY"),
                price_source,
                price_api_base_url: non_empty_env("PRICE_API_BASE_URL"),
                price_api_path: non_empty_env("PRICE_API_PATH"),
                price_api_headers_file: non_empty_env("PRICE_API_HEADERS_FILE").map(PathBuf::from),
                price_api_timeout_secs: env_parse("PRICE_API_TIMEOUT_SECS")?,
                price_api_retries: env_parse("PRICE_API_RETRIES")?,
                price_lookback_days: env_parse("PRICE_LOOKBACK_DAYS")?.unwrap_or(365),
                table_rows: env_parse("TABLE_ROWS")?.unwrap_or(10),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            };
            settings.validate()?;
            Ok(settings)
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(
                (1..=MAX_POOL_SIZE).contains(&self.pool_min)
                    && (1..=MAX_POOL_SIZE).contains(&self.pool_max),
                "DB_POOL_MIN and DB_POOL_MAX must be 1..={MAX_POOL_SIZE} (got {}..{})",
                self.pool_min,
                self.pool_max
            );
            anyhow::ensure!(
                self.pool_min <= self.pool_max,
                "DB_POOL_MIN ({}) must not exceed DB_POOL_MAX ({})",
                self.pool_min,
                self.pool_max
            );
            anyhow::ensure!(
                (1..=MAX_LOOKBACK_DAYS).contains(&self.price_lookback_days),
                "PRICE_LOOKBACK_DAYS must be 1..={MAX_LOOKBACK_DAYS} (got {})",
                self.price_lookback_days
            );
            anyhow::ensure!(self.table_rows >= 1, "TABLE_ROWS must be >= 1");
            Ok(())
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn has_database(&self) -> bool {
            self.database_url.is_some() || self.db_params.is_configured()
        }

        pub fn require_price_api_base_url(&self) -> anyhow::Result<&str> {
            self.price_api_base_url
                .as_deref()
                .context("PRICE_API_BASE_URL is required when PRICE_SOURCE=remote")
        }
    }

    fn non_empty_env(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match non_empty_env(key) {
            Some(s) => s
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid {key}={s}: {e}")),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn base() -> Settings {
            Settings {
                database_url: None,
                db_params: DbParams::default(),
                pool_min: 1,
                pool_max: 20,
                recommendations_query: None,
                price_history_query: None,
                price_source: PriceSource::Database,
                price_api_base_url: None,
                price_api_path: None,
                price_api_headers_file: None,
                price_api_timeout_secs: None,
                price_api_retries: None,
                price_lookback_days: 365,
                table_rows: 10,
                sentry_dsn: None,
            }
        }

        #[test]
        fn pool_bounds_are_enforced() {
            assert!(base().validate().is_ok());

            let mut s = base();
            s.pool_max = 21;
            assert!(s.validate().is_err());

            let mut s = base();
            s.pool_min = 0;
            assert!(s.validate().is_err());

            let mut s = base();
            s.pool_min = 10;
            s.pool_max = 5;
            assert!(s.validate().is_err());
        }

        #[test]
        fn lookback_is_bounded() {
            let mut s = base();
            s.price_lookback_days = MAX_LOOKBACK_DAYS;
            assert!(s.validate().is_ok());
            s.price_lookback_days = 200_000_000;
            assert!(s.validate().is_err());
            s.price_lookback_days = 0;
            assert!(s.validate().is_err());
        }

        #[test]
        fn parses_price_source() {
            assert_eq!("database".parse::<PriceSource>().unwrap(), PriceSource::Database);
            assert_eq!(" Remote ".parse::<PriceSource>().unwrap(), PriceSource::Remote);
            assert!("csv".parse::<PriceSource>().is_err());
        }

        #[test]
        fn discrete_params_need_host_and_dbname() {
            let mut s = base();
            assert!(!s.has_database());
            s.db_params.host = Some("localhost".to_string());
            assert!(!s.has_database());
            s.db_params.dbname = Some("stocks".to_string());
            assert!(s.has_database());
        }
    }
}
