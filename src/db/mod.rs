pub mod games;
pub mod predictions;

pub use games::{GamePage, GameQuery, GameStore, GameSummary, StoreStats};
pub use predictions::{PredictionLog, StoredPrediction};

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

/// Date columns are stored as ISO text so lexical order is chronological
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Open (and create if missing) a SQLite database
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>> {
    // Create data directory if needed
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }
    }

    // Parse connection options and enable create_if_missing
    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    Ok(pool)
}
