//! Discount classifier loaded from a scikit-learn RandomForest JSON export.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "model_type": "random_forest",
//!   "version": "2.0",
//!   "validation_method": "temporal_split",
//!   "trained_at": "2025-10-21T14:03:00",
//!   "metrics": { "f1_score": 0.71, "precision": 0.66, "recall": 0.77 },
//!   "feature_names": ["month", "day_of_week", ...],
//!   "n_features": 8,
//!   "n_classes": 2,
//!   "n_estimators": 100,
//!   "trees": [
//!     { "nodes": [
//!       { "feature": 7, "threshold": 20.5, "left": 1, "right": 2, "value": null },
//!       { "feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": [0.8, 0.2] },
//!       ...
//!     ] }
//!   ]
//! }
//! ```
//!
//! Leaves carry `[p_no_discount, p_discount]`; the forest probability is the
//! mean of the positive-class leaf values.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ModelError;
use crate::features::{FeatureVector, FEATURE_NAMES, N_FEATURES};

/// A binary classifier over the fixed feature vector.
///
/// Implementors must be `Send + Sync`: one instance is shared by every request.
pub trait DiscountClassifier: Send + Sync {
    /// Probability (0.0 - 1.0) that a discount happens within the window
    fn predict_probability(&self, features: &FeatureVector) -> f64;

    /// Version string reported with every prediction
    fn version(&self) -> &str;
}

/// A single node of a decision tree
#[derive(Debug, Clone, Deserialize)]
struct TreeNode {
    /// Feature index to split on (-1 for leaves)
    feature: i32,
    threshold: f64,
    left: i32,
    right: i32,
    /// Class probabilities for leaves
    value: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
struct RandomForestJson {
    model_type: String,
    #[serde(default = "unknown")]
    version: String,
    #[serde(default = "unknown")]
    validation_method: String,
    #[serde(default)]
    trained_at: Option<String>,
    #[serde(default)]
    metrics: ModelMetrics,
    feature_names: Vec<String>,
    n_features: usize,
    n_classes: usize,
    n_estimators: usize,
    trees: Vec<TreeJson>,
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Evaluation metrics recorded at training time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub f1_score: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub accuracy: Option<f64>,
    pub roc_auc: Option<f64>,
}

/// Descriptive information about a loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub validation_method: String,
    pub trained_at: Option<String>,
    pub features_count: usize,
    pub n_estimators: usize,
    pub metrics: ModelMetrics,
}

/// Random forest classifier loaded from JSON
#[derive(Debug, Clone)]
pub struct RandomForest {
    info: ModelInfo,
    trees: Vec<Vec<TreeNode>>,
}

impl RandomForest {
    /// Load a random forest from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let forest = Self::from_json_str(&content)?;
        info!(
            "Model v{} loaded from {} ({} trees, validation: {})",
            forest.info.version,
            path.display(),
            forest.info.n_estimators,
            forest.info.validation_method,
        );
        Ok(forest)
    }

    /// Load a random forest from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let model: RandomForestJson = serde_json::from_str(json)?;

        if model.model_type != "random_forest" {
            return Err(ModelError::Invalid(format!(
                "expected model_type 'random_forest', got '{}'",
                model.model_type
            )));
        }

        if model.n_features != N_FEATURES {
            return Err(ModelError::Invalid(format!(
                "expected {} features, got {}",
                N_FEATURES, model.n_features
            )));
        }

        // Training and serving must agree on the column order
        if model.feature_names != FEATURE_NAMES {
            return Err(ModelError::Invalid(format!(
                "feature order mismatch: expected {:?}, got {:?}",
                FEATURE_NAMES, model.feature_names
            )));
        }

        if model.n_classes != 2 {
            return Err(ModelError::Invalid(format!(
                "expected 2 classes, got {}",
                model.n_classes
            )));
        }

        if model.trees.is_empty() {
            return Err(ModelError::Invalid("random forest has no trees".to_string()));
        }

        if model.trees.len() != model.n_estimators {
            return Err(ModelError::Invalid(format!(
                "n_estimators ({}) doesn't match trees count ({})",
                model.n_estimators,
                model.trees.len()
            )));
        }

        let trees: Vec<Vec<TreeNode>> = model.trees.into_iter().map(|t| t.nodes).collect();
        for (i, nodes) in trees.iter().enumerate() {
            validate_tree(nodes).map_err(|e| ModelError::Invalid(format!("tree {}: {}", i, e)))?;
        }

        Ok(Self {
            info: ModelInfo {
                version: model.version,
                validation_method: model.validation_method,
                trained_at: model.trained_at,
                features_count: model.n_features,
                n_estimators: trees.len(),
                metrics: model.metrics,
            },
            trees,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Positive-class probability of the leaf reached in one tree.
    ///
    /// NaN or `<= threshold` goes left.
    fn traverse_tree(nodes: &[TreeNode], features: &[f64]) -> f64 {
        let mut node_idx = 0usize;

        loop {
            let node = &nodes[node_idx];

            if node.feature < 0 {
                return match &node.value {
                    Some(probs) if probs.len() >= 2 => probs[1],
                    _ => 0.0,
                };
            }

            let feature_val = features
                .get(node.feature as usize)
                .copied()
                .unwrap_or(f64::NAN);

            node_idx = if feature_val.is_nan() || feature_val <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

/// Check child indices so traversal cannot go out of bounds or loop
fn validate_tree(nodes: &[TreeNode]) -> Result<(), String> {
    if nodes.is_empty() {
        return Err("empty tree".to_string());
    }

    for (i, node) in nodes.iter().enumerate() {
        if node.feature < 0 {
            continue;
        }
        if node.feature as usize >= N_FEATURES {
            return Err(format!("node {} splits on unknown feature {}", i, node.feature));
        }
        for child in [node.left, node.right] {
            // Children always come after their parent in sklearn's pre-order layout
            if child <= i as i32 || child as usize >= nodes.len() {
                return Err(format!("node {} has invalid child {}", i, child));
            }
        }
    }

    Ok(())
}

impl DiscountClassifier for RandomForest {
    fn predict_probability(&self, features: &FeatureVector) -> f64 {
        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| Self::traverse_tree(tree, features.as_slice()))
            .sum();

        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    fn version(&self) -> &str {
        &self.info.version
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::features::CalendarFeatures;

    const NAMES: &str = r#"["month","day_of_week","is_weekend","quarter","is_summer_sale","is_winter_sale","final_price","discount_percent"]"#;

    /// Tree 1 splits on discount_percent (index 7), tree 2 on is_winter_sale (index 5)
    fn sample_forest_json() -> String {
        format!(
            r#"{{
            "model_type": "random_forest",
            "version": "2.0",
            "validation_method": "temporal_split",
            "trained_at": "2025-10-21T14:03:00",
            "metrics": {{"f1_score": 0.71, "precision": 0.66}},
            "feature_names": {NAMES},
            "n_features": 8,
            "n_classes": 2,
            "n_estimators": 2,
            "trees": [
                {{"nodes": [
                    {{"feature": 7, "threshold": 20.5, "left": 1, "right": 2, "value": null}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": [0.4, 0.6]}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": [0.9, 0.1]}}
                ]}},
                {{"nodes": [
                    {{"feature": 5, "threshold": 0.5, "left": 1, "right": 2, "value": null}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": [0.6, 0.4]}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": [0.0, 1.0]}}
                ]}}
            ]
        }}"#
        )
    }

    fn features(month: u32, discount: u8) -> FeatureVector {
        let date = NaiveDate::from_ymd_opt(2023, month, 10).unwrap();
        FeatureVector::new(&CalendarFeatures::from_date(date), 19.99, discount)
    }

    #[test]
    fn test_load_from_json() {
        let forest = RandomForest::from_json_str(&sample_forest_json()).unwrap();
        let info = forest.info();
        assert_eq!(info.version, "2.0");
        assert_eq!(info.validation_method, "temporal_split");
        assert_eq!(info.n_estimators, 2);
        assert_eq!(info.features_count, 8);
        assert_eq!(info.metrics.f1_score, Some(0.71));
        assert_eq!(info.metrics.recall, None);
        assert_eq!(forest.version(), "2.0");
    }

    #[test]
    fn test_predict_averaging() {
        let forest = RandomForest::from_json_str(&sample_forest_json()).unwrap();

        // No discount, March: 0.6 and 0.4
        let p = forest.predict_probability(&features(3, 0));
        assert!((p - 0.5).abs() < 1e-9);

        // Discounted, December: 0.1 and 1.0
        let p = forest.predict_probability(&features(12, 50));
        assert!((p - 0.55).abs() < 1e-9);

        // Discounted, March: 0.1 and 0.4
        let p = forest.predict_probability(&features(3, 50));
        assert!((p - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_wrong_model_type() {
        let json = sample_forest_json().replace("\"random_forest\"", "\"decision_tree\"");
        let err = RandomForest::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("random_forest"));
    }

    #[test]
    fn test_rejects_feature_order_mismatch() {
        let json = sample_forest_json().replace(
            r#""month","day_of_week""#,
            r#""day_of_week","month""#,
        );
        let err = RandomForest::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("feature order mismatch"));
    }

    #[test]
    fn test_rejects_bad_child_index() {
        let json = sample_forest_json().replace(
            r#""feature": 5, "threshold": 0.5, "left": 1, "right": 2"#,
            r#""feature": 5, "threshold": 0.5, "left": 1, "right": 9"#,
        );
        assert!(matches!(
            RandomForest::from_json_str(&json),
            Err(ModelError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_estimator_count_mismatch() {
        let json = sample_forest_json().replace("\"n_estimators\": 2", "\"n_estimators\": 3");
        assert!(RandomForest::from_json_str(&json).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = RandomForest::from_json("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }
}
