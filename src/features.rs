//! Calendar and price features shared by dataset building and prediction.
//!
//! The classifier consumes a [`FeatureVector`] whose positions follow
//! [`FEATURE_NAMES`]. Training exports declare the same names, and the model
//! loader rejects any file whose order differs.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::PriceObservation;

/// Number of model inputs
pub const N_FEATURES: usize = 8;

/// Feature order expected by the classifier
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "month",
    "day_of_week",
    "is_weekend",
    "quarter",
    "is_summer_sale",
    "is_winter_sale",
    "final_price",
    "discount_percent",
];

/// Features that depend only on the calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// 1 - 12
    pub month: u32,
    /// 1 - 4
    pub quarter: u32,
    /// 0 - 6, Monday = 0
    pub day_of_week: u32,
    /// Saturday or Sunday
    pub is_weekend: bool,
    /// June or July
    pub is_summer_sale: bool,
    /// December or January
    pub is_winter_sale: bool,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month();
        let day_of_week = date.weekday().num_days_from_monday();

        Self {
            month,
            quarter: (month - 1) / 3 + 1,
            day_of_week,
            is_weekend: day_of_week >= 5,
            is_summer_sale: matches!(month, 6 | 7),
            is_winter_sale: matches!(month, 12 | 1),
        }
    }
}

/// Model input in the fixed [`FEATURE_NAMES`] order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; N_FEATURES]);

impl FeatureVector {
    pub fn new(calendar: &CalendarFeatures, final_price: f64, discount_percent: u8) -> Self {
        Self([
            f64::from(calendar.month),
            f64::from(calendar.day_of_week),
            flag(calendar.is_weekend),
            f64::from(calendar.quarter),
            flag(calendar.is_summer_sale),
            flag(calendar.is_winter_sale),
            final_price,
            f64::from(discount_percent),
        ])
    }

    /// Features of an observation on its own date
    pub fn from_observation(observation: &PriceObservation) -> Self {
        Self::for_date(observation.date, observation)
    }

    /// Calendar features of `as_of` with the price context of `latest`
    pub fn for_date(as_of: NaiveDate, latest: &PriceObservation) -> Self {
        Self::new(
            &CalendarFeatures::from_date(as_of),
            latest.final_price,
            latest.discount_percent,
        )
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Value of a named feature
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    pub fn final_price(&self) -> f64 {
        self.0[6]
    }

    pub fn discount_percent(&self) -> f64 {
        self.0[7]
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
