use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{GameCatalogEntry, PriceObservation};

/// Read access to catalog entries and price histories
pub trait GameRepository: Send + Sync {
    /// Catalog entry of a game, None when unknown
    fn find_game(&self, appid: u32) -> impl Future<Output = Result<Option<GameCatalogEntry>>> + Send;

    /// Up to `limit` most recent observations dated on or before `as_of`, oldest first
    fn recent_prices(
        &self,
        appid: u32,
        as_of: NaiveDate,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PriceObservation>>> + Send;
}

/// Repository over data already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    games: HashMap<u32, GameCatalogEntry>,
    prices: HashMap<u32, Vec<PriceObservation>>,
}

impl MemoryRepository {
    pub fn new(catalog: Vec<GameCatalogEntry>, observations: Vec<PriceObservation>) -> Self {
        let games = catalog.into_iter().map(|g| (g.appid, g)).collect();

        let mut prices: HashMap<u32, Vec<PriceObservation>> = HashMap::new();
        for observation in observations {
            prices.entry(observation.appid).or_default().push(observation);
        }
        for series in prices.values_mut() {
            series.sort_by_key(|o| o.date);
            series.dedup_by_key(|o| o.date);
        }

        Self { games, prices }
    }
}

impl GameRepository for MemoryRepository {
    async fn find_game(&self, appid: u32) -> Result<Option<GameCatalogEntry>> {
        Ok(self.games.get(&appid).cloned())
    }

    async fn recent_prices(
        &self,
        appid: u32,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<PriceObservation>> {
        let Some(series) = self.prices.get(&appid) else {
            return Ok(Vec::new());
        };

        let end = series.partition_point(|o| o.date <= as_of);
        let start = end.saturating_sub(limit);
        Ok(series[start..end].to_vec())
    }
}
