use crate::config::Settings;
use crate::dashboard::source::PriceHistorySource;
use crate::domain::price::PriceBar;
use crate::error::{DashboardError, Result};
use crate::remote::types::ColumnarHistory;
use crate::time::window::PriceWindow;
use anyhow::Context;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/chart-api/v2/ohlcs/stock";
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;
const RESOLUTION: &str = "1d";

#[derive(Deserialize)]
#[serde(untagged)]
enum HeadersFile {
    Wrapped { headers: BTreeMap<String, String> },
    Flat(BTreeMap<String, String>),
}

/// Parses a YAML header map, either flat or nested under a `headers:` key.
pub fn parse_headers_yaml(text: &str) -> anyhow::Result<HeaderMap> {
    let parsed: HeadersFile = serde_yaml::from_str(text).context("invalid headers YAML")?;
    let map = match parsed {
        HeadersFile::Wrapped { headers } => headers,
        HeadersFile::Flat(headers) => headers,
    };

    let mut out = HeaderMap::new();
    for (name, value) in map {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("invalid header name: {name}"))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid value for header {name}"))?;
        out.insert(name, value);
    }
    Ok(out)
}

pub fn load_headers(path: &Path) -> anyhow::Result<HeaderMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read headers file {}", path.display()))?;
    parse_headers_yaml(&text)
}

struct AttemptError {
    retryable: bool,
    error: DashboardError,
}

impl AttemptError {
    fn retryable(error: DashboardError) -> Self {
        Self { retryable: true, error }
    }

    fn fatal(error: DashboardError) -> Self {
        Self { retryable: false, error }
    }
}

#[derive(Debug, Clone)]
pub struct HttpPriceHistoryClient {
    http: reqwest::Client,
    base_url: String,
    path: String,
    headers: HeaderMap,
    retries: u32,
    backoff_base: Duration,
}

impl HttpPriceHistoryClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::build(base_url.into(), DEFAULT_TIMEOUT_SECS)
    }

    fn build(base_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build price api http client")?;

        Ok(Self {
            http,
            base_url,
            path: DEFAULT_PATH.to_string(),
            headers: HeaderMap::new(),
            retries: DEFAULT_RETRIES,
            backoff_base: Duration::from_secs(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_price_api_base_url()?.to_string();
        let timeout_secs = settings
            .price_api_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut client = Self::build(base_url, timeout_secs)?;
        if let Some(path) = settings.price_api_path.as_deref() {
            client = client.with_path(path);
        }
        if let Some(retries) = settings.price_api_retries {
            client = client.with_retries(retries);
        }
        if let Some(file) = settings.price_api_headers_file.as_deref() {
            client = client.with_headers(load_headers(file)?);
        }
        Ok(client)
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.clamp(1, MAX_RETRIES);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Doubles per attempt, saturating instead of overflowing.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn fetch_remote_history(
        &self,
        ticker: &str,
        from_unix: i64,
        to_unix: i64,
    ) -> Result<Vec<PriceBar>> {
        if from_unix > to_unix {
            return Err(DashboardError::RemoteFetch(format!(
                "empty time window: from={from_unix} > to={to_unix}"
            )));
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(ticker, from_unix, to_unix).await {
                Ok(bars) => {
                    tracing::debug!(%ticker, attempt, bars = bars.len(), "fetched remote price history");
                    return Ok(bars);
                }
                Err(err) => {
                    if !err.retryable || attempt >= self.retries {
                        return Err(err.error);
                    }
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err.error, "price api fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        ticker: &str,
        from_unix: i64,
        to_unix: i64,
    ) -> std::result::Result<Vec<PriceBar>, AttemptError> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers.clone())
            .query(&[
                ("symbol", ticker.to_string()),
                ("resolution", RESOLUTION.to_string()),
                ("from", from_unix.to_string()),
                ("to", to_unix.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AttemptError::retryable(e.into()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| AttemptError::retryable(e.into()))?;

        if !status.is_success() {
            let err = DashboardError::RemoteFetch(format!("price api HTTP {status}: {text}"));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AttemptError::retryable(err)
            } else {
                AttemptError::fatal(err)
            });
        }

        let payload = serde_json::from_str::<ColumnarHistory>(&text).map_err(|e| {
            AttemptError::fatal(DashboardError::RemoteFetch(format!(
                "price api response is not valid history JSON: {e}"
            )))
        })?;
        payload.into_bars().map_err(AttemptError::fatal)
    }
}

#[async_trait::async_trait]
impl PriceHistorySource for HttpPriceHistoryClient {
    fn source_name(&self) -> &'static str {
        "remote"
    }

    async fn fetch_price_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let window = PriceWindow { from, to };
        let (from_unix, to_unix) = window.unix_bounds();
        let mut bars = self.fetch_remote_history(ticker, from_unix, to_unix).await?;
        bars.retain(|b| window.contains(b.date));
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn history_json() -> Value {
        json!({
            "t": [1728518400],
            "o": [158000],
            "h": [161000],
            "l": [157500],
            "c": [160000],
            "v": [1500000]
        })
    }

    #[tokio::test]
    async fn fetches_with_params_and_headers() {
        let router = Router::new().route(
            DEFAULT_PATH,
            get(
                |Query(q): Query<HashMap<String, String>>, headers: axum::http::HeaderMap| async move {
                    let ok = q.get("symbol").map(String::as_str) == Some("ACB")
                        && q.get("resolution").map(String::as_str) == Some("1d")
                        && q.get("from").map(String::as_str) == Some("1728000000")
                        && q.get("to").map(String::as_str) == Some("1728600000")
                        && headers.get("x-client").and_then(|v| v.to_str().ok()) == Some("dash");
                    if ok {
                        (StatusCode::OK, Json(history_json()))
                    } else {
                        (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})))
                    }
                },
            ),
        );
        let base = serve(router).await;

        let headers = parse_headers_yaml("headers:\n  x-client: dash\n").unwrap();
        let client = HttpPriceHistoryClient::new(base)
            .unwrap()
            .with_headers(headers)
            .with_retries(1);

        let bars = client
            .fetch_remote_history("ACB", 1_728_000_000, 1_728_600_000)
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 160.0);
        assert_eq!(
            bars[0].date,
            NaiveDate::from_ymd_opt(2024, 10, 10).unwrap()
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().route(
            DEFAULT_PATH,
            get(|| async { (StatusCode::FORBIDDEN, "denied") }),
        );
        let base = serve(router).await;
        let client = HttpPriceHistoryClient::new(base).unwrap().with_retries(3);

        let err = client
            .fetch_remote_history("ACB", 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::RemoteFetch(ref m) if m.contains("403")));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let router = Router::new().route(DEFAULT_PATH, get(|| async { "<html>oops</html>" }));
        let base = serve(router).await;
        let client = HttpPriceHistoryClient::new(base).unwrap().with_retries(1);

        let err = client
            .fetch_remote_history("ACB", 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::RemoteFetch(_)));
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            DEFAULT_PATH,
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
                    } else {
                        (StatusCode::OK, Json(history_json()))
                    }
                }
            }),
        );
        let base = serve(router).await;
        let client = HttpPriceHistoryClient::new(base)
            .unwrap()
            .with_retries(2)
            .with_backoff_base(Duration::from_millis(1));

        let bars = client.fetch_remote_history("ACB", 0, 2_000_000_000).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn trait_fetch_clips_to_window() {
        let router = Router::new().route(
            DEFAULT_PATH,
            get(|| async {
                Json(json!({
                    "t": [1728432000, 1728518400],
                    "o": [1, 2], "h": [1, 2], "l": [1, 2], "c": [1000, 2000]
                }))
            }),
        );
        let base = serve(router).await;
        let client = HttpPriceHistoryClient::new(base).unwrap().with_retries(1);

        let d = NaiveDate::from_ymd_opt(2024, 10, 10).unwrap();
        let bars = client.fetch_price_history("ACB", d, d).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 2.0);
    }

    #[test]
    fn retry_count_and_backoff_are_bounded() {
        let client = HttpPriceHistoryClient::new("http://127.0.0.1:9")
            .unwrap()
            .with_retries(100);
        assert_eq!(client.retries, MAX_RETRIES);
        assert_eq!(client.clone().with_retries(0).retries, 1);

        assert_eq!(client.backoff_for(1), Duration::from_secs(1));
        assert_eq!(client.backoff_for(3), Duration::from_secs(4));
        // Shift past the integer width saturates rather than panicking.
        assert_eq!(
            client.backoff_for(40),
            Duration::from_secs(1).saturating_mul(u32::MAX)
        );
    }

    #[test]
    fn parses_flat_headers_yaml() {
        let h = parse_headers_yaml("User-Agent: dash/1.0\nAccept: application/json\n").unwrap();
        assert_eq!(h.get("user-agent").unwrap(), "dash/1.0");
        assert_eq!(h.get("accept").unwrap(), "application/json");
        assert!(parse_headers_yaml("- just\n- a list\n").is_err());
    }
}
