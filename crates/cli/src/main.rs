use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticker_dash_core::dashboard::render::{Panel, RenderModel};
use ticker_dash_core::dashboard::Dashboard;

mod seed;

#[derive(Debug, Parser)]
#[command(name = "ticker_dash_cli")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render the dashboard for one ticker.
    Render {
        #[arg(long)]
        ticker: String,

        /// Print the full render model as JSON instead of a text summary.
        #[arg(long)]
        json: bool,
    },

    /// Apply database migrations.
    Migrate,

    /// Insert deterministic demo rows for a ticker.
    Seed {
        #[arg(long)]
        ticker: String,

        /// Number of trading days to generate.
        #[arg(long, default_value_t = 30)]
        days: usize,

        /// Last date to generate (YYYY-MM-DD). Defaults to today's UTC date.
        #[arg(long)]
        end_date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ticker_dash_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(args.command, &settings).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

async fn run(command: Command, settings: &ticker_dash_core::config::Settings) -> anyhow::Result<()> {
    match command {
        Command::Render { ticker, json } => {
            let (pool, _) = ticker_dash_core::storage::connect_or_lazy(settings).await?;
            let dashboard = Dashboard::from_settings(settings, pool)?;
            let model = dashboard.on_ticker_submitted(&ticker).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&model)?);
            } else {
                print_summary(&model);
            }
            anyhow::ensure!(!model.is_rejected_input(), "invalid ticker: {ticker:?}");
        }
        Command::Migrate => {
            let pool = connect(settings).await?;
            ticker_dash_core::storage::migrate(&pool).await?;
            tracing::info!("migrations applied");
        }
        Command::Seed {
            ticker,
            days,
            end_date,
        } => {
            let ticker = ticker_dash_core::dashboard::normalize_ticker(&ticker)?;
            let end = match end_date.as_deref() {
                Some(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .with_context(|| format!("invalid --end-date: {s}"))?,
                None => chrono::Utc::now().date_naive(),
            };
            let pool = connect(settings).await?;
            ticker_dash_core::storage::migrate(&pool).await?;
            let inserted = seed::seed_demo_rows(&pool, &ticker, end, days).await?;
            tracing::info!(%ticker, %end, days, inserted, "seeded demo rows");
        }
    }
    Ok(())
}

async fn connect(settings: &ticker_dash_core::config::Settings) -> anyhow::Result<sqlx::PgPool> {
    let opts = ticker_dash_core::storage::connect_options(settings)?;
    ticker_dash_core::storage::pool_options(settings)
        .connect_with(opts)
        .await
        .context("connect to database failed")
}

fn print_summary(model: &RenderModel) {
    match &model.window {
        Some(w) => println!("{} (prices {}..={})", model.ticker, w.from, w.to),
        None => println!("{}", model.ticker),
    }

    match &model.recommendations {
        Panel::Ready { data } => {
            let r = &data.latest;
            println!(
                "  latest recommendation {} on {}: buy {:.1}% / neutral {:.1}% / sell {:.1}%",
                r.record.recommendation,
                r.record.date,
                r.ratios.buy_prob * 100.0,
                r.ratios.neutral_prob * 100.0,
                r.ratios.sell_prob * 100.0,
            );
            println!(
                "  {} dated rows, {} skipped with zero counts",
                data.ratio_series.len(),
                data.skipped_rows
            );
        }
        Panel::NoData { message } => println!("  recommendations: {message}"),
        Panel::Failed { message, .. } => println!("  recommendations unavailable: {message}"),
    }

    match &model.prices {
        Panel::Ready { data } => {
            let s = &data.summary;
            let change = s
                .change_pct
                .map(|c| format!("{c:+.2}%"))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "  close {:.2} on {} ({} bars from {}, change {change}, range {:.2}..{:.2})",
                s.latest_close,
                s.last_date,
                data.bars.len(),
                data.source,
                s.period_low,
                s.period_high,
            );
            for bar in &data.table {
                println!(
                    "    {}  open {:.2}  high {:.2}  low {:.2}  close {:.2}",
                    bar.date, bar.open, bar.high, bar.low, bar.close
                );
            }
        }
        Panel::NoData { message } => println!("  prices: {message}"),
        Panel::Failed { message, .. } => println!("  prices unavailable: {message}"),
    }
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
