use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{RawFeatures, CATEGORICAL_FEATURES};

/// Code assigned to a category that was never seen during training.
pub const UNSEEN_CATEGORY_CODE: f64 = -1.0;

/// Category-to-code mapping learned once per training cycle.
///
/// Codes are assigned in lexicographic order of the normalized category labels, so two
/// encoders fitted on the same rows are identical. The snapshot is never mutated after
/// fitting; inference shares it read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    mappings: BTreeMap<String, BTreeMap<String, u32>>,
}

impl CategoryEncoder {
    pub fn fit(rows: &[RawFeatures]) -> Self {
        let mut mappings = BTreeMap::new();

        for (idx, feature) in CATEGORICAL_FEATURES.iter().enumerate() {
            let mut labels: Vec<String> = rows
                .iter()
                .map(|row| normalize_label(&row.categorical[idx]))
                .collect();
            labels.sort();
            labels.dedup();

            let codes = labels
                .into_iter()
                .enumerate()
                .map(|(code, label)| (label, code as u32))
                .collect();
            mappings.insert(feature.name.to_string(), codes);
        }

        Self { mappings }
    }

    /// Numeric code for `value` under `feature`, or [`UNSEEN_CATEGORY_CODE`].
    pub fn code(&self, feature: &str, value: &str) -> f64 {
        self.mappings
            .get(feature)
            .and_then(|codes| codes.get(&normalize_label(value)))
            .map_or(UNSEEN_CATEGORY_CODE, |code| f64::from(*code))
    }

    pub fn categories(&self, feature: &str) -> Option<&BTreeMap<String, u32>> {
        self.mappings.get(feature)
    }
}

fn normalize_label(value: &str) -> String {
    value.trim().to_lowercase()
}
