use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticker_dash_core::dashboard::render::{Panel, RenderModel};
use ticker_dash_core::dashboard::Dashboard;
use ticker_dash_core::domain::melt::MeltedRating;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ticker_dash_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let (pool, connected) = ticker_dash_core::storage::connect_or_lazy(&settings).await?;
    if connected {
        if let Err(e) = ticker_dash_core::storage::migrate(&pool).await {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
        }
    } else {
        tracing::warn!("database unreachable at startup; requests will report connection errors");
    }

    let dashboard = Dashboard::from_settings(&settings, pool)?;
    let state = AppState {
        dashboard: Arc::new(dashboard),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, price_source = ?settings.price_source, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/dashboard/:ticker", get(get_dashboard))
        .route("/dashboard/:ticker/melted", get(get_melted))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    dashboard: Arc<Dashboard>,
}

struct RenderResponse(RenderModel);

impl IntoResponse for RenderResponse {
    fn into_response(self) -> Response {
        // Failed panels are part of a successful render; only rejected input is a client error.
        let status = if self.0.is_rejected_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        };
        (status, Json(self.0)).into_response()
    }
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> RenderResponse {
    RenderResponse(state.dashboard.on_ticker_submitted(&ticker).await)
}

async fn get_melted(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<MeltedRating>>, (StatusCode, Json<serde_json::Value>)> {
    let model = state.dashboard.on_ticker_submitted(&ticker).await;
    match model.recommendations {
        Panel::Ready { data } => Ok(Json(data.melted)),
        Panel::NoData { .. } => Ok(Json(Vec::new())),
        Panel::Failed { kind, message } => {
            let status = match kind {
                ticker_dash_core::error::ErrorKind::InvalidTicker => StatusCode::BAD_REQUEST,
                ticker_dash_core::error::ErrorKind::Connection => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(serde_json::json!({ "kind": kind, "error": message }))))
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &ticker_dash_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
