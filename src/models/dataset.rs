use serde::{Deserialize, Serialize};

use crate::features::CalendarFeatures;
use crate::models::PriceObservation;

/// One row of the supervised training table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    /// The anchor observation
    pub observation: PriceObservation,

    /// Catalog name, empty when the game is missing from the catalog
    pub name: String,

    /// Target: a discount above the threshold happens within the forward window
    pub will_have_discount: bool,

    /// Calendar features of the anchor date
    pub calendar: CalendarFeatures,
}

/// Counts reported by a dataset build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Observations handed to the assembler
    pub rows_in: usize,

    /// Distinct games seen
    pub games: usize,

    /// Repeated (appid, date) observations dropped before labeling
    pub duplicates_dropped: usize,

    /// Anchors whose forward window ran past the end of the history
    pub discarded_insufficient_history: usize,

    /// Emitted rows whose game had no catalog entry
    pub rows_without_catalog: usize,

    /// Rows in the final table
    pub final_rows: usize,

    pub positives: usize,
    pub negatives: usize,
}

impl DatasetSummary {
    /// Share of positive labels, 0.0 for an empty table
    pub fn positive_rate(&self) -> f64 {
        if self.final_rows == 0 {
            0.0
        } else {
            self.positives as f64 / self.final_rows as f64
        }
    }
}
