use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A game from the store catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCatalogEntry {
    /// Store application id
    pub appid: u32,

    /// Display name
    pub name: String,

    /// Free-to-play games never need to wait for a discount
    pub is_free_to_play: bool,

    /// Catalog type ("game", "dlc", ...), informational only
    pub game_type: Option<String>,

    /// Release date, when the catalog had a parseable one
    pub release_date: Option<NaiveDate>,
}

impl GameCatalogEntry {
    pub fn new(appid: u32, name: impl Into<String>, is_free_to_play: bool) -> Self {
        Self {
            appid,
            name: name.into(),
            is_free_to_play,
            game_type: None,
            release_date: None,
        }
    }
}
