use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path
    pub database_url: String,

    /// Random forest JSON export
    pub model_path: PathBuf,

    /// Game catalog CSV (appid, type, name, releasedate, freetoplay)
    pub catalog_path: PathBuf,

    /// Directory of `<appid>.csv` price history files
    pub price_history_dir: PathBuf,

    /// Where build_dataset writes the labeled table
    pub dataset_output: PathBuf,

    /// Most recent observations fetched per prediction
    pub history_limit: usize,

    /// Maximum games per batch prediction
    pub batch_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/discounts.db".to_string()),

            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "ml_model/discount_predictor.json".to_string())
                .into(),

            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "data/applicationInformation.csv".to_string())
                .into(),

            price_history_dir: env::var("PRICE_HISTORY_DIR")
                .unwrap_or_else(|_| "data/PriceHistory".to_string())
                .into(),

            dataset_output: env::var("DATASET_OUTPUT")
                .unwrap_or_else(|_| "data/data_with_binary_target.csv".to_string())
                .into(),

            history_limit: env::var("HISTORY_LIMIT")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("HISTORY_LIMIT must be a valid number")?,

            batch_limit: env::var("BATCH_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("BATCH_LIMIT must be a valid number")?,
        })
    }
}
