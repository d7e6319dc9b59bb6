use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PredictionError;

/// Outcome of a discount prediction for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub appid: u32,

    pub game_name: String,

    /// Predicted class: discount above the threshold within the window
    pub will_have_discount: bool,

    /// Probability of the positive class (0.0 - 1.0)
    pub probability: f64,

    /// Distance from the decision boundary, scaled to 0.0 - 1.0
    pub confidence: f64,

    pub recommendation: Recommendation,

    /// Human-readable factors behind the recommendation
    pub reasoning: Vec<String>,

    /// Discount of the most recent observation
    pub current_discount: u8,

    /// Price of the most recent observation, None for free-to-play games
    pub current_price: Option<f64>,

    pub model_version: String,

    /// As-of date the features were derived for
    pub prediction_date: NaiveDate,
}

/// Purchase recommendation derived from the predicted probability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recommendation {
    /// High probability of a better discount soon
    #[serde(rename = "WAIT")]
    Wait,
    /// Moderate probability of a better discount soon
    #[serde(rename = "CONSIDER WAITING")]
    ConsiderWaiting,
    /// Low probability and the current discount is already large
    #[serde(rename = "BUY NOW")]
    BuyNow,
    /// Low probability of a better discount soon
    #[serde(rename = "BUY IF WANTED")]
    BuyIfWanted,
    /// Nothing to wait for
    #[serde(rename = "FREE TO PLAY")]
    FreeToPlay,
}

impl Recommendation {
    /// Map a probability onto a recommendation.
    ///
    /// Both probability bounds are strict: exactly `wait_threshold` is
    /// `ConsiderWaiting`, exactly `decision_threshold` falls through to the
    /// buy branches.
    pub fn from_probability(
        probability: f64,
        current_discount: u8,
        wait_threshold: f64,
        decision_threshold: f64,
        large_discount: u8,
    ) -> Self {
        if probability > wait_threshold {
            Recommendation::Wait
        } else if probability > decision_threshold {
            Recommendation::ConsiderWaiting
        } else if current_discount > large_discount {
            Recommendation::BuyNow
        } else {
            Recommendation::BuyIfWanted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Wait => "WAIT",
            Recommendation::ConsiderWaiting => "CONSIDER WAITING",
            Recommendation::BuyNow => "BUY NOW",
            Recommendation::BuyIfWanted => "BUY IF WANTED",
            Recommendation::FreeToPlay => "FREE TO PLAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAIT" => Some(Recommendation::Wait),
            "CONSIDER WAITING" => Some(Recommendation::ConsiderWaiting),
            "BUY NOW" => Some(Recommendation::BuyNow),
            "BUY IF WANTED" => Some(Recommendation::BuyIfWanted),
            "FREE TO PLAY" => Some(Recommendation::FreeToPlay),
            _ => None,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch item that could not be predicted
#[derive(Debug, Serialize)]
pub struct PredictionFailure {
    pub appid: u32,
    pub error: PredictionError,
}

/// Result of a batch prediction; both lists keep the request order
#[derive(Debug, Serialize)]
pub struct BatchPrediction {
    pub predictions: Vec<PredictionResult>,
    pub errors: Vec<PredictionFailure>,
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub model_version: String,
}
