use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use discount_forecast::classifier::{DiscountClassifier, RandomForest};
use discount_forecast::config::Config;
use discount_forecast::db::{GameQuery, GameStore, PredictionLog};
use discount_forecast::loader::Loader;
use discount_forecast::predictor::{DiscountPredictor, PredictionPolicy};

#[derive(Debug, Parser)]
#[command(name = "discount-forecast", version, about = "Steam discount forecasting")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the catalog and price history CSVs into the database
    Import {
        /// Catalog CSV, defaults to CATALOG_PATH
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Price history directory, defaults to PRICE_HISTORY_DIR
        #[arg(long)]
        prices: Option<PathBuf>,
    },
    /// Predict discounts for one or more games
    Predict {
        #[arg(required = true)]
        appids: Vec<u32>,
        /// As-of date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// List games in the database
    Games {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        free_only: bool,
        #[arg(long, default_value_t = 100)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Previously logged predictions for a game, newest first
    History {
        appid: u32,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Database statistics and model information
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discount_forecast=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Initialize database
    let store = GameStore::new(&config.database_url).await?;

    match cli.command {
        Command::Import { catalog, prices } => {
            let catalog = catalog.unwrap_or_else(|| config.catalog_path.clone());
            let prices = prices.unwrap_or_else(|| config.price_history_dir.clone());
            import(&store, catalog, prices).await
        }
        Command::Predict { appids, as_of } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            predict(&config, store, &appids, as_of).await
        }
        Command::Games {
            search,
            free_only,
            limit,
            offset,
        } => {
            let page = store
                .list_games(&GameQuery {
                    search,
                    free_only,
                    limit,
                    offset,
                })
                .await?;
            print_json(&page)
        }
        Command::History { appid, limit } => {
            let log = PredictionLog::new(store.pool().clone()).await?;
            let history = log.get_predictions_for_game(appid, limit).await?;
            info!("{} logged predictions for game {}", history.len(), appid);
            print_json(&history)
        }
        Command::Stats => stats(&config, &store).await,
    }
}

async fn import(store: &GameStore, catalog: PathBuf, prices: PathBuf) -> Result<()> {
    info!(
        "Importing catalog {} and price history {}",
        catalog.display(),
        prices.display()
    );

    let raw = tokio::task::spawn_blocking(move || Loader::default().load(&catalog, &prices))
        .await
        .context("Loader task panicked")??;

    for error in &raw.report.errors {
        warn!("{}", error);
    }

    let games = store.upsert_games(&raw.catalog).await?;
    let prices = store.insert_prices(&raw.observations).await?;
    info!(
        "Import complete: {} games upserted, {} new price records",
        games, prices
    );

    Ok(())
}

async fn predict(config: &Config, store: GameStore, appids: &[u32], as_of: NaiveDate) -> Result<()> {
    let model = RandomForest::from_json(&config.model_path)?;
    let log = PredictionLog::new(store.pool().clone()).await?;

    let policy = PredictionPolicy {
        history_limit: config.history_limit,
        batch_limit: config.batch_limit,
        ..Default::default()
    };
    let predictor = DiscountPredictor::with_policy(store, Arc::new(model), policy);
    info!(
        "Predicting {} game(s) as of {} with model v{} (min history {})",
        appids.len(),
        as_of,
        predictor.model_version(),
        predictor.policy().min_history
    );

    if let [appid] = appids {
        let result = predictor.predict(*appid, as_of).await?;
        log.record_all(std::slice::from_ref(&result)).await;
        return print_json(&result);
    }

    let batch = predictor.predict_batch(appids, as_of).await?;
    log.record_all(&batch.predictions).await;
    print_json(&batch)
}

#[derive(Serialize)]
struct StatsReport<'a> {
    database: discount_forecast::db::StoreStats,
    predictions_logged: i64,
    model: Option<&'a discount_forecast::classifier::ModelInfo>,
}

async fn stats(config: &Config, store: &GameStore) -> Result<()> {
    let database = store.stats().await?;
    let predictions_logged = PredictionLog::new(store.pool().clone())
        .await?
        .get_prediction_count()
        .await?;

    let model = match RandomForest::from_json(&config.model_path) {
        Ok(model) => {
            info!("Model version {}", model.version());
            Some(model)
        }
        Err(e) => {
            warn!("Model unavailable: {}", e);
            None
        }
    };

    print_json(&StatsReport {
        database,
        predictions_logged,
        model: model.as_ref().map(|m| m.info()),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}
