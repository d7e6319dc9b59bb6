use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::info;

use super::{connect, DATE_FORMAT};
use crate::models::{GameCatalogEntry, PriceObservation};
use crate::repository::GameRepository;

/// Hard cap on a single page of games
const MAX_PAGE_SIZE: i64 = 1000;

/// SQLite store for the game catalog and price history
#[derive(Clone)]
pub struct GameStore {
    pool: Pool<Sqlite>,
}

/// Filters for listing games
#[derive(Debug, Clone)]
pub struct GameQuery {
    /// Substring match on the name
    pub search: Option<String>,
    pub free_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for GameQuery {
    fn default() -> Self {
        Self {
            search: None,
            free_only: false,
            limit: 100,
            offset: 0,
        }
    }
}

/// A catalog entry with its latest price
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    #[serde(flatten)]
    pub game: GameCatalogEntry,
    pub current_price: Option<f64>,
    pub current_discount: Option<u8>,
    pub price_records: i64,
}

/// One page of games plus the total matching the filters
#[derive(Debug, Clone, Serialize)]
pub struct GamePage {
    pub games: Vec<GameSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_games: i64,
    pub free_games: i64,
    pub paid_games: i64,
    pub total_price_records: i64,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

impl GameStore {
    /// Create a new game store and initialize the database
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = connect(database_url).await?;
        let store = Self { pool };
        store.init_schema().await?;

        info!("Game store initialized");
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                appid INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                game_type TEXT,
                release_date TEXT,
                free_to_play BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create games table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                appid INTEGER NOT NULL,
                date TEXT NOT NULL,
                final_price REAL NOT NULL,
                discount INTEGER NOT NULL DEFAULT 0,
                UNIQUE (appid, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create price_history table")?;

        // Create index on name for searches
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_games_name
            ON games (name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create index on (appid, date) for history lookups
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_price_history_appid_date
            ON price_history (appid, date)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update catalog entries in one transaction
    pub async fn upsert_games(&self, games: &[GameCatalogEntry]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for game in games {
            let result = sqlx::query(
                r#"
                INSERT INTO games (appid, name, game_type, release_date, free_to_play)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (appid) DO UPDATE SET
                    name = excluded.name,
                    game_type = excluded.game_type,
                    release_date = excluded.release_date,
                    free_to_play = excluded.free_to_play
                "#,
            )
            .bind(i64::from(game.appid))
            .bind(&game.name)
            .bind(&game.game_type)
            .bind(game.release_date.map(|d| d.format(DATE_FORMAT).to_string()))
            .bind(game.is_free_to_play)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert game {}", game.appid))?;

            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit games")?;
        Ok(written)
    }

    /// Insert price observations in one transaction; existing (appid, date) rows are kept
    pub async fn insert_prices(&self, observations: &[PriceObservation]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for observation in observations {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO price_history (appid, date, final_price, discount)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(i64::from(observation.appid))
            .bind(observation.date.format(DATE_FORMAT).to_string())
            .bind(observation.final_price)
            .bind(i64::from(observation.discount_percent))
            .execute(&mut *tx)
            .await
            .context("Failed to insert price observation")?;

            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit price history")?;
        Ok(inserted)
    }

    /// Get a game by appid
    pub async fn find_game(&self, appid: u32) -> Result<Option<GameCatalogEntry>> {
        let row = sqlx::query_as::<_, GameRow>(
            "SELECT appid, name, game_type, release_date, free_to_play FROM games WHERE appid = ?",
        )
        .bind(i64::from(appid))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch game")?;

        row.map(GameCatalogEntry::try_from).transpose()
    }

    /// Most recent observations on or before `as_of`, returned oldest first
    pub async fn recent_prices(
        &self,
        appid: u32,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<PriceObservation>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT appid, date, final_price, discount FROM price_history
            WHERE appid = ? AND date <= ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(appid))
        .bind(as_of.format(DATE_FORMAT).to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch price history")?;

        let mut observations = rows
            .into_iter()
            .map(PriceObservation::try_from)
            .collect::<Result<Vec<_>>>()?;
        observations.reverse();
        Ok(observations)
    }

    /// Get every catalog entry, ordered by appid
    pub async fn all_games(&self) -> Result<Vec<GameCatalogEntry>> {
        let rows = sqlx::query_as::<_, GameRow>(
            "SELECT appid, name, game_type, release_date, free_to_play FROM games ORDER BY appid",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch games")?;

        rows.into_iter().map(GameCatalogEntry::try_from).collect()
    }

    /// Get every price observation, ordered by appid then date
    pub async fn all_observations(&self) -> Result<Vec<PriceObservation>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT appid, date, final_price, discount FROM price_history ORDER BY appid, date",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch price history")?;

        rows.into_iter().map(PriceObservation::try_from).collect()
    }

    /// List games with their latest price
    pub async fn list_games(&self, query: &GameQuery) -> Result<GamePage> {
        let pattern = query.search.as_ref().map(|s| format!("%{}%", s));
        let limit = query.limit.clamp(0, MAX_PAGE_SIZE);
        let offset = query.offset.max(0);

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM games
            WHERE (?1 IS NULL OR name LIKE ?1) AND (?2 = 0 OR free_to_play = 1)
            "#,
        )
        .bind(&pattern)
        .bind(query.free_only)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count games")?;

        let rows = sqlx::query_as::<_, GameSummaryRow>(
            r#"
            SELECT
                g.appid, g.name, g.game_type, g.release_date, g.free_to_play,
                (SELECT ph.final_price FROM price_history ph
                 WHERE ph.appid = g.appid ORDER BY ph.date DESC LIMIT 1) AS current_price,
                (SELECT ph.discount FROM price_history ph
                 WHERE ph.appid = g.appid ORDER BY ph.date DESC LIMIT 1) AS current_discount,
                (SELECT COUNT(*) FROM price_history ph WHERE ph.appid = g.appid) AS price_records
            FROM games g
            WHERE (?1 IS NULL OR g.name LIKE ?1) AND (?2 = 0 OR g.free_to_play = 1)
            ORDER BY g.appid
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(&pattern)
        .bind(query.free_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list games")?;

        let games = rows
            .into_iter()
            .map(GameSummary::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(GamePage {
            has_more: offset + (games.len() as i64) < total.0,
            games,
            total: total.0,
            limit,
            offset,
        })
    }

    /// Get aggregate counts and price statistics
    pub async fn stats(&self) -> Result<StoreStats> {
        let (total_games, free_games): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(free_to_play), 0) FROM games",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count games")?;

        let (total_price_records, avg, min, max): (i64, Option<f64>, Option<f64>, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(*), AVG(final_price), MIN(final_price), MAX(final_price) FROM price_history",
            )
            .fetch_one(&self.pool)
            .await
            .context("Failed to compute price statistics")?;

        Ok(StoreStats {
            total_games,
            free_games,
            paid_games: total_games - free_games,
            total_price_records,
            average_price: (avg.unwrap_or(0.0) * 100.0).round() / 100.0,
            min_price: min.unwrap_or(0.0),
            max_price: max.unwrap_or(0.0),
        })
    }
}

impl GameRepository for GameStore {
    async fn find_game(&self, appid: u32) -> Result<Option<GameCatalogEntry>> {
        GameStore::find_game(self, appid).await
    }

    async fn recent_prices(
        &self,
        appid: u32,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<PriceObservation>> {
        GameStore::recent_prices(self, appid, as_of, limit).await
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct GameRow {
    appid: i64,
    name: String,
    game_type: Option<String>,
    release_date: Option<String>,
    free_to_play: bool,
}

impl TryFrom<GameRow> for GameCatalogEntry {
    type Error = anyhow::Error;

    fn try_from(row: GameRow) -> Result<Self> {
        Ok(GameCatalogEntry {
            appid: u32::try_from(row.appid).context("appid out of range")?,
            name: row.name,
            is_free_to_play: row.free_to_play,
            game_type: row.game_type,
            release_date: row
                .release_date
                .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    appid: i64,
    date: String,
    final_price: f64,
    discount: i64,
}

impl TryFrom<PriceRow> for PriceObservation {
    type Error = anyhow::Error;

    fn try_from(row: PriceRow) -> Result<Self> {
        Ok(PriceObservation {
            appid: u32::try_from(row.appid).context("appid out of range")?,
            date: NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
                .with_context(|| format!("Invalid stored date '{}'", row.date))?,
            final_price: row.final_price,
            discount_percent: u8::try_from(row.discount).context("discount out of range")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GameSummaryRow {
    #[sqlx(flatten)]
    game: GameRow,
    current_price: Option<f64>,
    current_discount: Option<i64>,
    price_records: i64,
}

impl TryFrom<GameSummaryRow> for GameSummary {
    type Error = anyhow::Error;

    fn try_from(row: GameSummaryRow) -> Result<Self> {
        Ok(GameSummary {
            game: row.game.try_into()?,
            current_price: row.current_price,
            current_discount: row
                .current_discount
                .map(u8::try_from)
                .transpose()
                .context("discount out of range")?,
            price_records: row.price_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn temp_store() -> (tempfile::TempDir, GameStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("games.db").display());
        let store = GameStore::new(&url).await.unwrap();
        (dir, store)
    }

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 2, 1).unwrap() + Duration::days(offset)
    }

    fn catalog() -> Vec<GameCatalogEntry> {
        let mut portal = GameCatalogEntry::new(400, "Portal", false);
        portal.game_type = Some("game".to_string());
        portal.release_date = NaiveDate::from_ymd_opt(2007, 10, 10);
        vec![
            portal,
            GameCatalogEntry::new(570, "Dota 2", true),
            GameCatalogEntry::new(620, "Portal 2", false),
        ]
    }

    #[tokio::test]
    async fn test_games_round_trip_and_upsert() {
        let (_dir, store) = temp_store().await;
        store.upsert_games(&catalog()).await.unwrap();

        let portal = store.find_game(400).await.unwrap().unwrap();
        assert_eq!(portal, catalog()[0]);
        assert!(store.find_game(1).await.unwrap().is_none());

        let renamed = vec![GameCatalogEntry::new(400, "Portal (2007)", false)];
        store.upsert_games(&renamed).await.unwrap();
        assert_eq!(store.find_game(400).await.unwrap().unwrap().name, "Portal (2007)");
        assert_eq!(store.all_games().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_prices_ignore_duplicates_and_filter_by_date() {
        let (_dir, store) = temp_store().await;
        store.upsert_games(&catalog()).await.unwrap();

        let observations: Vec<PriceObservation> = (0..10)
            .map(|d| PriceObservation::new(400, day(d), 9.99, (d * 10) as u8))
            .collect();
        assert_eq!(store.insert_prices(&observations).await.unwrap(), 10);
        assert_eq!(store.insert_prices(&observations[..3]).await.unwrap(), 0);

        let recent = store.recent_prices(400, day(6), 4).await.unwrap();
        let dates: Vec<NaiveDate> = recent.iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![day(3), day(4), day(5), day(6)]);
        assert_eq!(recent[3].discount_percent, 60);

        assert_eq!(store.all_observations().await.unwrap(), observations);
    }

    #[tokio::test]
    async fn test_list_games_filters() {
        let (_dir, store) = temp_store().await;
        store.upsert_games(&catalog()).await.unwrap();
        store
            .insert_prices(&[
                PriceObservation::new(620, day(0), 19.99, 0),
                PriceObservation::new(620, day(1), 4.99, 75),
            ])
            .await
            .unwrap();

        let page = store
            .list_games(&GameQuery {
                search: Some("Portal".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(!page.has_more);
        assert_eq!(page.games[1].game.appid, 620);
        assert_eq!(page.games[1].current_price, Some(4.99));
        assert_eq!(page.games[1].current_discount, Some(75));
        assert_eq!(page.games[1].price_records, 2);
        assert_eq!(page.games[0].current_price, None);

        let free = store
            .list_games(&GameQuery {
                free_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(free.total, 1);
        assert_eq!(free.games[0].game.name, "Dota 2");

        let first = store
            .list_games(&GameQuery {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.games.len(), 1);
        assert!(first.has_more);
    }

    #[tokio::test]
    async fn test_stats() {
        let (_dir, store) = temp_store().await;
        store.upsert_games(&catalog()).await.unwrap();
        store
            .insert_prices(&[
                PriceObservation::new(400, day(0), 10.0, 0),
                PriceObservation::new(620, day(0), 20.0, 0),
                PriceObservation::new(620, day(1), 5.0, 75),
            ])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_games, 3);
        assert_eq!(stats.free_games, 1);
        assert_eq!(stats.paid_games, 2);
        assert_eq!(stats.total_price_records, 3);
        assert_eq!(stats.average_price, 11.67);
        assert_eq!(stats.min_price, 5.0);
        assert_eq!(stats.max_price, 20.0);
    }
}
