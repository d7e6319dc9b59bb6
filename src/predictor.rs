use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::classifier::DiscountClassifier;
use crate::error::PredictionError;
use crate::features::{CalendarFeatures, FeatureVector};
use crate::models::{
    BatchPrediction, GameCatalogEntry, PredictionFailure, PredictionResult, Recommendation,
};
use crate::repository::GameRepository;

/// Business rules applied around the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionPolicy {
    /// Observations required before the model is consulted
    pub min_history: usize,
    /// Most recent observations fetched per request
    pub history_limit: usize,
    /// `probability > decision_threshold` predicts a discount
    pub decision_threshold: f64,
    /// `probability > wait_threshold` recommends waiting
    pub wait_threshold: f64,
    /// Current discount above which a low probability means "buy now"
    pub large_discount: u8,
    /// Maximum games per batch request
    pub batch_limit: usize,
    /// Answer free-to-play games without consulting history or model
    pub free_to_play_short_circuit: bool,
}

impl Default for PredictionPolicy {
    fn default() -> Self {
        Self {
            min_history: 30,
            history_limit: 120,
            decision_threshold: 0.5,
            wait_threshold: 0.7,
            large_discount: 50,
            batch_limit: 50,
            free_to_play_short_circuit: true,
        }
    }
}

/// Maps catalog and price history onto classifier predictions
pub struct DiscountPredictor<R> {
    repository: R,
    classifier: Arc<dyn DiscountClassifier>,
    policy: PredictionPolicy,
}

impl<R: GameRepository> DiscountPredictor<R> {
    pub fn new(repository: R, classifier: Arc<dyn DiscountClassifier>) -> Self {
        Self::with_policy(repository, classifier, PredictionPolicy::default())
    }

    pub fn with_policy(
        repository: R,
        classifier: Arc<dyn DiscountClassifier>,
        policy: PredictionPolicy,
    ) -> Self {
        Self {
            repository,
            classifier,
            policy,
        }
    }

    pub fn policy(&self) -> &PredictionPolicy {
        &self.policy
    }

    pub fn model_version(&self) -> &str {
        self.classifier.version()
    }

    /// Predict whether `appid` gets a discount within the window after `as_of`
    pub async fn predict(
        &self,
        appid: u32,
        as_of: NaiveDate,
    ) -> Result<PredictionResult, PredictionError> {
        let game = self
            .repository
            .find_game(appid)
            .await?
            .ok_or(PredictionError::NotFound { appid })?;

        if game.is_free_to_play && self.policy.free_to_play_short_circuit {
            debug!("Game {} is free-to-play, skipping model", appid);
            return Ok(self.free_to_play_result(game, as_of));
        }

        let history = self
            .repository
            .recent_prices(appid, as_of, self.policy.history_limit.max(self.policy.min_history))
            .await?;

        let Some(latest) = history.iter().max_by_key(|o| o.date) else {
            return Err(PredictionError::InsufficientHistory {
                required: self.policy.min_history,
                found: 0,
            });
        };
        if history.len() < self.policy.min_history {
            return Err(PredictionError::InsufficientHistory {
                required: self.policy.min_history,
                found: history.len(),
            });
        }

        let calendar = CalendarFeatures::from_date(as_of);
        let features = FeatureVector::new(&calendar, latest.final_price, latest.discount_percent);

        let probability = self.classifier.predict_probability(&features).clamp(0.0, 1.0);
        let confidence = (probability - 0.5).abs() * 2.0;
        let current_discount = latest.discount_percent;

        let recommendation = Recommendation::from_probability(
            probability,
            current_discount,
            self.policy.wait_threshold,
            self.policy.decision_threshold,
            self.policy.large_discount,
        );

        let mut reasoning = Vec::new();
        if current_discount > 0 {
            reasoning.push(format!("Currently {}% off", current_discount));
        }
        if calendar.is_summer_sale {
            reasoning.push("Summer sale period (June/July)".to_string());
        } else if calendar.is_winter_sale {
            reasoning.push("Winter sale period (December/January)".to_string());
        }

        let result = PredictionResult {
            appid,
            game_name: game.name,
            will_have_discount: probability > self.policy.decision_threshold,
            probability,
            confidence,
            recommendation,
            reasoning,
            current_discount,
            current_price: Some(latest.final_price),
            model_version: self.classifier.version().to_string(),
            prediction_date: as_of,
        };

        info!(
            "Prediction | {} ({}) | p={:.3} | confidence={:.2} | {}",
            result.game_name, appid, probability, confidence, recommendation,
        );

        Ok(result)
    }

    /// Predict a list of games; per-game failures are collected, not propagated
    pub async fn predict_batch(
        &self,
        appids: &[u32],
        as_of: NaiveDate,
    ) -> Result<BatchPrediction, PredictionError> {
        if appids.len() > self.policy.batch_limit {
            return Err(PredictionError::BatchTooLarge {
                requested: appids.len(),
                max: self.policy.batch_limit,
            });
        }

        let mut predictions = Vec::new();
        let mut errors = Vec::new();

        for &appid in appids {
            match self.predict(appid, as_of).await {
                Ok(result) => predictions.push(result),
                Err(error) => {
                    warn!("Prediction failed for game {}: {}", appid, error);
                    errors.push(PredictionFailure { appid, error });
                }
            }
        }

        info!(
            "Batch prediction: {} requested, {} successful, {} failed",
            appids.len(),
            predictions.len(),
            errors.len()
        );

        Ok(BatchPrediction {
            total_requested: appids.len(),
            successful: predictions.len(),
            failed: errors.len(),
            predictions,
            errors,
            model_version: self.classifier.version().to_string(),
        })
    }

    fn free_to_play_result(&self, game: GameCatalogEntry, as_of: NaiveDate) -> PredictionResult {
        PredictionResult {
            appid: game.appid,
            game_name: game.name,
            will_have_discount: false,
            probability: 0.0,
            confidence: 1.0,
            recommendation: Recommendation::FreeToPlay,
            reasoning: vec!["free-to-play".to_string()],
            current_discount: 0,
            current_price: None,
            model_version: self.classifier.version().to_string(),
            prediction_date: as_of,
        }
    }
}
