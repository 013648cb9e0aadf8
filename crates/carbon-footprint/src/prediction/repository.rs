use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dataset::dataset_row;
use super::domain::DerivedSubmission;
use super::features::FeatureDeriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{:06}", self.0)
    }
}

/// A logged prediction request, optionally labelled with the realized emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub submission: DerivedSubmission,
    pub predicted_co2: f64,
    pub actual_co2: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Training-table row for labelled records, keyed by dataset column name.
    pub fn dataset_row(&self) -> Option<BTreeMap<&'static str, String>> {
        self.actual_co2
            .map(|actual| dataset_row(&FeatureDeriver::raw_features(&self.submission), actual))
    }
}

/// Storage abstraction for the submission log.
pub trait SubmissionStore: Send + Sync {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, StoreError>;
    fn record_actual(&self, id: SubmissionId, actual_co2: f64) -> Result<(), StoreError>;
    /// Every record carrying a realized emission value.
    fn labelled(&self) -> Result<Vec<SubmissionRecord>, StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("submission store unavailable: {0}")]
    Unavailable(String),
}
