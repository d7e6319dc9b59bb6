use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use super::DATE_FORMAT;
use crate::models::{PredictionResult, Recommendation};

/// SQLite log of served predictions
pub struct PredictionLog {
    pool: Pool<Sqlite>,
}

/// A prediction read back from the log
#[derive(Debug, Clone, Serialize)]
pub struct StoredPrediction {
    pub id: i64,
    pub result: PredictionResult,
    pub created_at: DateTime<Utc>,
}

impl PredictionLog {
    /// Create the log on an existing pool and initialize its table
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self> {
        let log = Self { pool };
        log.init_schema().await?;

        info!("Prediction log initialized");
        Ok(log)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                appid INTEGER NOT NULL,
                game_name TEXT NOT NULL,
                prediction_date TEXT NOT NULL,
                will_have_discount BOOLEAN NOT NULL,
                probability REAL NOT NULL,
                confidence REAL NOT NULL,
                recommendation TEXT NOT NULL,
                reasoning TEXT NOT NULL,
                current_discount INTEGER NOT NULL,
                current_price REAL,
                model_version TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create predictions table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_appid
            ON predictions (appid)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_created
            ON predictions (created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new prediction
    pub async fn insert_prediction(&self, result: &PredictionResult) -> Result<i64> {
        let reasoning =
            serde_json::to_string(&result.reasoning).context("Failed to encode reasoning")?;

        let row = sqlx::query(
            r#"
            INSERT INTO predictions (
                appid,
                game_name,
                prediction_date,
                will_have_discount,
                probability,
                confidence,
                recommendation,
                reasoning,
                current_discount,
                current_price,
                model_version,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(result.appid))
        .bind(&result.game_name)
        .bind(result.prediction_date.format(DATE_FORMAT).to_string())
        .bind(result.will_have_discount)
        .bind(result.probability)
        .bind(result.confidence)
        .bind(result.recommendation.as_str())
        .bind(reasoning)
        .bind(i64::from(result.current_discount))
        .bind(result.current_price)
        .bind(&result.model_version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert prediction")?;

        Ok(row.last_insert_rowid())
    }

    /// Insert every result, logging failures instead of returning them.
    ///
    /// Returns how many were recorded.
    pub async fn record_all(&self, results: &[PredictionResult]) -> usize {
        let mut recorded = 0;
        for result in results {
            match self.insert_prediction(result).await {
                Ok(_) => recorded += 1,
                Err(e) => warn!("Failed to record prediction for game {}: {:#}", result.appid, e),
            }
        }
        recorded
    }

    /// Get recent predictions for a game
    pub async fn get_predictions_for_game(
        &self,
        appid: u32,
        limit: i64,
    ) -> Result<Vec<StoredPrediction>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT * FROM predictions
            WHERE appid = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(appid))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch predictions")?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Get count of predictions
    pub async fn get_prediction_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM predictions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count predictions")?;

        Ok(row.0)
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    appid: i64,
    game_name: String,
    prediction_date: String,
    will_have_discount: bool,
    probability: f64,
    confidence: f64,
    recommendation: String,
    reasoning: String,
    current_discount: i64,
    current_price: Option<f64>,
    model_version: String,
    created_at: String,
}

impl From<PredictionRow> for StoredPrediction {
    fn from(row: PredictionRow) -> Self {
        StoredPrediction {
            id: row.id,
            result: PredictionResult {
                appid: row.appid as u32,
                game_name: row.game_name,
                will_have_discount: row.will_have_discount,
                probability: row.probability,
                confidence: row.confidence,
                recommendation: Recommendation::parse(&row.recommendation)
                    .unwrap_or(Recommendation::BuyIfWanted),
                reasoning: serde_json::from_str(&row.reasoning).unwrap_or_default(),
                current_discount: row.current_discount.clamp(0, 100) as u8,
                current_price: row.current_price,
                model_version: row.model_version,
                prediction_date: NaiveDate::parse_from_str(&row.prediction_date, DATE_FORMAT)
                    .unwrap_or_default(),
            },
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;

    fn sample(appid: u32, recommendation: Recommendation) -> PredictionResult {
        PredictionResult {
            appid,
            game_name: "Portal 2".to_string(),
            will_have_discount: true,
            probability: 0.82,
            confidence: 0.64,
            recommendation,
            reasoning: vec!["Currently 10% off".to_string()],
            current_discount: 10,
            current_price: Some(8.99),
            model_version: "2.0".to_string(),
            prediction_date: NaiveDate::from_ymd_opt(2024, 6, 20).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("log.db").display());
        let log = PredictionLog::new(connect(&url).await.unwrap()).await.unwrap();

        let first = log.insert_prediction(&sample(620, Recommendation::Wait)).await.unwrap();
        let second = log
            .insert_prediction(&sample(620, Recommendation::ConsiderWaiting))
            .await
            .unwrap();
        log.insert_prediction(&sample(400, Recommendation::BuyNow)).await.unwrap();
        assert!(second > first);

        let stored = log.get_predictions_for_game(620, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, second);
        assert_eq!(stored[0].result, sample(620, Recommendation::ConsiderWaiting));
        assert_eq!(stored[1].result.recommendation, Recommendation::Wait);
        assert_eq!(log.get_prediction_count().await.unwrap(), 3);

        let json = serde_json::to_value(&stored[0]).unwrap();
        assert_eq!(json["id"], second);
        assert_eq!(json["result"]["recommendation"], "CONSIDER WAITING");
    }

    #[tokio::test]
    async fn test_record_all_survives_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("log.db").display());
        let log = PredictionLog::new(connect(&url).await.unwrap()).await.unwrap();

        let results = vec![sample(620, Recommendation::Wait), sample(400, Recommendation::BuyNow)];
        assert_eq!(log.record_all(&results).await, 2);

        sqlx::query("DROP TABLE predictions")
            .execute(&log.pool)
            .await
            .unwrap();
        assert_eq!(log.record_all(&results).await, 0);
    }
}
