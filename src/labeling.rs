//! Forward-looking discount labels.
//!
//! An anchor observation is labeled `true` when the same game has an
//! observation strictly after the anchor date, at most `window_days` later,
//! with a discount strictly above `discount_threshold`. Only future rows are
//! read, so perturbing the anchor or anything before it never changes the
//! label.

use crate::error::LabelError;
use crate::models::PriceObservation;

/// Look-ahead window and discount threshold used for labeling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPolicy {
    /// Calendar days after the anchor that belong to the window (inclusive)
    pub window_days: i64,
    /// A discount must be strictly greater than this to count
    pub discount_threshold: u8,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            window_days: 30,
            discount_threshold: 20,
        }
    }
}

impl LabelPolicy {
    fn qualifies(&self, observation: &PriceObservation) -> bool {
        observation.discount_percent > self.discount_threshold
    }

    /// Censoring check: the history must extend at least a full window past the anchor.
    fn check_coverage(
        &self,
        anchor: &PriceObservation,
        last: &PriceObservation,
    ) -> Result<(), LabelError> {
        let observed_days = days_between(anchor, last);
        if observed_days < self.window_days {
            return Err(LabelError::RightCensored {
                observed_days,
                window_days: self.window_days,
            });
        }
        Ok(())
    }
}

fn days_between(from: &PriceObservation, to: &PriceObservation) -> i64 {
    to.date.signed_duration_since(from.date).num_days()
}

/// Label one anchor of a game's history, which must be sorted by date.
///
/// Scans forward from the anchor and stops at the first qualifying discount.
pub fn label_at(
    series: &[PriceObservation],
    index: usize,
    policy: &LabelPolicy,
) -> Result<bool, LabelError> {
    let anchor = series.get(index).ok_or(LabelError::OutOfRange {
        index,
        len: series.len(),
    })?;
    // Non-empty: `get` succeeded
    let last = &series[series.len() - 1];
    policy.check_coverage(anchor, last)?;

    for observation in &series[index + 1..] {
        let offset = days_between(anchor, observation);
        if offset <= 0 {
            continue;
        }
        if offset > policy.window_days {
            break;
        }
        if policy.qualifies(observation) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Label every anchor of a game's history in a single pass.
///
/// The series must be sorted by date; otherwise every anchor gets
/// [`LabelError::Unsorted`]. On sorted input this is equivalent to calling
/// [`label_at`] for each index. The window bounds only move forward, so the
/// whole series costs O(n).
pub fn label_series(
    series: &[PriceObservation],
    policy: &LabelPolicy,
) -> Vec<Result<bool, LabelError>> {
    if let Some(pos) = series.windows(2).position(|w| w[0].date > w[1].date) {
        return vec![Err(LabelError::Unsorted { index: pos + 1 }); series.len()];
    }

    let Some(last) = series.last() else {
        return Vec::new();
    };

    // qualifying[k] = number of qualifying observations in series[..k]
    let mut qualifying = Vec::with_capacity(series.len() + 1);
    qualifying.push(0usize);
    for observation in series {
        let prev = qualifying[qualifying.len() - 1];
        qualifying.push(prev + usize::from(policy.qualifies(observation)));
    }

    let mut labels = Vec::with_capacity(series.len());
    // First index strictly after the anchor date
    let mut start = 0;
    // One past the last index inside the window
    let mut end = 0;

    for (i, anchor) in series.iter().enumerate() {
        start = start.max(i + 1);
        while start < series.len() && days_between(anchor, &series[start]) <= 0 {
            start += 1;
        }
        end = end.max(start);
        while end < series.len() && days_between(anchor, &series[end]) <= policy.window_days {
            end += 1;
        }

        let label = policy
            .check_coverage(anchor, last)
            .map(|()| qualifying[end] > qualifying[start]);
        labels.push(label);
    }

    labels
}
