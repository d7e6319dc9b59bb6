use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use discount_forecast::config::Config;
use discount_forecast::dataset::{build_labeled_dataset_with, write_dataset_file};
use discount_forecast::db::GameStore;
use discount_forecast::labeling::LabelPolicy;
use discount_forecast::loader::Loader;

/// Build the labeled discount dataset from raw price histories
#[derive(Debug, Parser)]
#[command(name = "build_dataset", version)]
struct Args {
    /// Catalog CSV, defaults to CATALOG_PATH
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Price history directory, defaults to PRICE_HISTORY_DIR
    #[arg(long)]
    prices: Option<PathBuf>,

    /// Output CSV, defaults to DATASET_OUTPUT
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Read catalog and prices from DATABASE_URL instead of CSV files
    #[arg(long)]
    from_db: bool,

    /// Forward-looking window in days
    #[arg(long, default_value_t = 30)]
    window_days: i64,

    /// A discount strictly above this percentage counts as positive
    #[arg(long, default_value_t = 20)]
    threshold: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "build_dataset=info,discount_forecast=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let output = args.output.unwrap_or_else(|| config.dataset_output.clone());
    let policy = LabelPolicy {
        window_days: args.window_days,
        discount_threshold: args.threshold,
    };

    let (catalog, observations) = if args.from_db {
        info!("Reading catalog and price history from {}", config.database_url);
        let store = GameStore::new(&config.database_url).await?;
        (store.all_games().await?, store.all_observations().await?)
    } else {
        let catalog_path = args.catalog.unwrap_or_else(|| config.catalog_path.clone());
        let price_dir = args.prices.unwrap_or_else(|| config.price_history_dir.clone());
        let raw = tokio::task::spawn_blocking(move || {
            Loader::default().load(&catalog_path, &price_dir)
        })
        .await
        .context("Loader task panicked")??;

        for error in &raw.report.errors {
            warn!("{}", error);
        }
        (raw.catalog, raw.observations)
    };

    info!(
        "Labeling {} observations (window {} days, discount > {}%)",
        observations.len(),
        policy.window_days,
        policy.discount_threshold
    );

    let (rows, summary) = tokio::task::spawn_blocking(move || {
        build_labeled_dataset_with(&catalog, &observations, &policy)
    })
    .await
    .context("Dataset task panicked")?;

    if rows.is_empty() {
        warn!("No labeled rows produced; is the price history long enough?");
    }

    write_dataset_file(&output, &rows)?;

    info!(
        "Completed! {} rows from {} games ({} positive, {} negative, {:.1}% positive)",
        summary.final_rows,
        summary.games,
        summary.positives,
        summary.negatives,
        summary.positive_rate() * 100.0
    );
    info!(
        "Dropped: {} duplicates, {} right-censored anchors; {} rows without catalog entry",
        summary.duplicates_dropped,
        summary.discarded_insufficient_history,
        summary.rows_without_catalog
    );

    Ok(())
}
