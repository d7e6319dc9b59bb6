use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Price of one game on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub appid: u32,

    pub date: NaiveDate,

    /// Price actually charged that day (non-negative)
    pub final_price: f64,

    /// Percent off the list price, 0..=100
    pub discount_percent: u8,
}

impl PriceObservation {
    pub fn new(appid: u32, date: NaiveDate, final_price: f64, discount_percent: u8) -> Self {
        Self {
            appid,
            date,
            final_price,
            discount_percent,
        }
    }
}
