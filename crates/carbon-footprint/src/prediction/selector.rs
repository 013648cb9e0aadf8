use std::cmp::Ordering;

use super::models::ModelFamily;
use super::trainer::FamilyMetrics;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no model family trained successfully")]
    EmptyPool,
}

/// Picks the live family: highest r2, then lowest MAE, then family priority.
pub struct ModelSelector;

impl ModelSelector {
    pub fn select<'a, I>(candidates: I) -> Result<ModelFamily, SelectionError>
    where
        I: IntoIterator<Item = (ModelFamily, &'a FamilyMetrics)>,
    {
        candidates
            .into_iter()
            .min_by(|(left_family, left), (right_family, right)| {
                compare(left, right).then_with(|| left_family.cmp(right_family))
            })
            .map(|(family, _)| family)
            .ok_or(SelectionError::EmptyPool)
    }
}

/// `Less` means `left` is the better model.
fn compare(left: &FamilyMetrics, right: &FamilyMetrics) -> Ordering {
    rank(right.r2)
        .total_cmp(&rank(left.r2))
        .then_with(|| rank_error(left.mae).total_cmp(&rank_error(right.mae)))
}

// Non-finite scores always lose.
fn rank(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

fn rank_error(error: f64) -> f64 {
    if error.is_finite() {
        error
    } else {
        f64::INFINITY
    }
}
