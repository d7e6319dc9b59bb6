pub mod dataset;
pub mod game;
pub mod prediction;
pub mod price;

pub use dataset::{DatasetSummary, LabeledRow};
pub use game::GameCatalogEntry;
pub use prediction::{BatchPrediction, PredictionFailure, PredictionResult, Recommendation};
pub use price::PriceObservation;
