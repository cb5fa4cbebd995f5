//! polyhouse-ingest binary entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use polyhouse_polygon::PolygonClient;
use polyhouse_schemas::{EnumRegistry, Table};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use polyhouse_ingest::config::Overrides;
use polyhouse_ingest::lister::load_blacklist;
use polyhouse_ingest::{storage, Config, DateRangeOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "polyhouse-ingest")]
#[command(about = "Ingest Polygon trades and ticker details over a date range")]
struct Args {
    /// Path to ingest configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// First date to ingest (inclusive, YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last date to ingest (inclusive, YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Table to ingest; repeat for several
    #[arg(long = "table")]
    tables: Vec<Table>,

    /// Number of concurrent fetch workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Polygon API key, used when the config file has none
    #[arg(long, env = "POLYGON_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    config.apply(Overrides {
        from: args.from,
        to: args.to,
        tables: args.tables,
        concurrency: args.concurrency,
        api_key: args.api_key,
    });
    config.validate()?;
    let (from, to) = config.date_range()?;

    let registry = match &config.enums {
        Some(path) => EnumRegistry::load(path)
            .with_context(|| format!("failed to load enum registry {}", path.display()))?,
        None => EnumRegistry::builtin(),
    };
    let blacklist = match &config.ingest.blacklist_file {
        Some(path) => load_blacklist(path)
            .with_context(|| format!("failed to load blacklist {}", path.display()))?,
        None => Default::default(),
    };

    let client = PolygonClient::new(
        &config.polygon.base_url,
        config.polygon.api_key.clone(),
        config.polygon.timeout(),
    )?
    .with_page_limit(config.polygon.page_limit);
    let store = storage::open(&config.storage, &registry)?;

    info!(
        storage = config.storage.backend(),
        tapes = registry.tapes().len(),
        participants = registry.participants().len(),
        blacklisted = blacklist.len(),
        "Starting polyhouse-ingest"
    );

    let orchestrator = DateRangeOrchestrator::new(
        Arc::new(client),
        store,
        Arc::new(registry),
        blacklist,
        config.settings(),
    );

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after buffered rows are flushed");
            shutdown.cancel();
        }
    });

    match orchestrator.run(from, to).await {
        Ok(summary) => {
            info!(
                dates = summary.dates.len(),
                rows = summary.rows_written(),
                "Done"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Ingestion aborted");
            Err(e.into())
        }
    }
}
