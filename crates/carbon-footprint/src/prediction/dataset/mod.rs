//! Training dataset loading and cleaning.

mod parser;

pub use parser::RawTable;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use super::features::{
    RawFeatures, CATEGORICAL_FEATURES, NUMERIC_FEATURES, TARGET_COLUMN, UNKNOWN_CATEGORY,
};

/// Dataset failures; any of these aborts the whole training cycle.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read training dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid training CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("training dataset is missing required column `{0}`")]
    MissingColumn(String),
    #[error("row {row}: column `{column}` holds non-numeric value '{value}'")]
    Malformed {
        row: usize,
        column: String,
        value: String,
    },
    #[error("column `{0}` has no values to impute from")]
    EmptyColumn(String),
    #[error("training dataset has {rows} usable rows; at least {required} are needed")]
    InsufficientRows { rows: usize, required: usize },
}

/// Supplier of the historical training table.
pub trait TrainingDataSource: Send + Sync {
    fn load(&self) -> Result<RawTable, DataError>;
}

impl TrainingDataSource for RawTable {
    fn load(&self) -> Result<RawTable, DataError> {
        Ok(self.clone())
    }
}

/// Reads the training table from a CSV file on every load.
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    path: PathBuf,
}

impl CsvDatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrainingDataSource for CsvDatasetSource {
    fn load(&self) -> Result<RawTable, DataError> {
        let file = std::fs::File::open(&self.path)?;
        RawTable::from_reader(file)
    }
}

/// Cleaned rows ready for feature encoding, paired with their targets.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    pub rows: Vec<RawFeatures>,
    pub targets: Vec<f64>,
    pub dropped_rows: usize,
}

impl PreparedDataset {
    /// Drop rows without a target, impute numeric gaps with the column median and
    /// categorical gaps with [`UNKNOWN_CATEGORY`].
    pub fn from_table(table: &RawTable) -> Result<Self, DataError> {
        let target_idx = required_column(table, TARGET_COLUMN)?;
        let categorical_idx = CATEGORICAL_FEATURES
            .iter()
            .map(|column| required_column(table, column.dataset_column))
            .collect::<Result<Vec<_>, _>>()?;
        let numeric_idx = NUMERIC_FEATURES
            .iter()
            .map(|column| required_column(table, column.dataset_column))
            .collect::<Result<Vec<_>, _>>()?;

        let mut categorical_rows = Vec::new();
        let mut numeric_rows: Vec<Vec<Option<f64>>> = Vec::new();
        let mut targets = Vec::new();
        let mut dropped_rows = 0;

        for (position, row) in table.rows().iter().enumerate() {
            let row_number = position + 1;
            let Some(target) = parse_cell(row, target_idx, TARGET_COLUMN, row_number)? else {
                dropped_rows += 1;
                continue;
            };

            let categorical: Vec<String> = categorical_idx
                .iter()
                .map(|&idx| {
                    let value = row[idx].trim();
                    if value.is_empty() {
                        UNKNOWN_CATEGORY.to_string()
                    } else {
                        value.to_string()
                    }
                })
                .collect();

            let numeric = numeric_idx
                .iter()
                .zip(NUMERIC_FEATURES.iter())
                .map(|(&idx, column)| parse_cell(row, idx, column.dataset_column, row_number))
                .collect::<Result<Vec<_>, _>>()?;

            categorical_rows.push(categorical);
            numeric_rows.push(numeric);
            targets.push(target);
        }

        if targets.len() < 2 {
            return Err(DataError::InsufficientRows {
                rows: targets.len(),
                required: 2,
            });
        }

        let medians = NUMERIC_FEATURES
            .iter()
            .enumerate()
            .map(|(col, column)| {
                let present: Vec<f64> = numeric_rows.iter().filter_map(|row| row[col]).collect();
                median(present).ok_or_else(|| DataError::EmptyColumn(column.dataset_column.into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = categorical_rows
            .into_iter()
            .zip(numeric_rows)
            .map(|(categorical, numeric)| {
                let mut raw = RawFeatures::default();
                for (slot, value) in raw.categorical.iter_mut().zip(categorical) {
                    *slot = value;
                }
                for (idx, value) in numeric.into_iter().enumerate() {
                    raw.numeric[idx] = value.unwrap_or(medians[idx]);
                }
                raw
            })
            .collect::<Vec<_>>();

        info!(
            rows = rows.len(),
            dropped_rows, "training dataset prepared"
        );

        Ok(Self {
            rows,
            targets,
            dropped_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every column the training table must carry, target last.
pub fn schema_columns() -> Vec<String> {
    CATEGORICAL_FEATURES
        .iter()
        .chain(NUMERIC_FEATURES.iter())
        .map(|column| column.dataset_column.to_string())
        .chain(std::iter::once(TARGET_COLUMN.to_string()))
        .collect()
}

/// Render features plus target as a row keyed by dataset column name.
pub fn dataset_row(raw: &RawFeatures, target: f64) -> BTreeMap<&'static str, String> {
    let mut row = BTreeMap::new();
    for (column, value) in CATEGORICAL_FEATURES.iter().zip(raw.categorical.iter()) {
        row.insert(column.dataset_column, value.clone());
    }
    for (column, value) in NUMERIC_FEATURES.iter().zip(raw.numeric.iter()) {
        row.insert(column.dataset_column, value.to_string());
    }
    row.insert(TARGET_COLUMN, target.to_string());
    row
}

fn required_column(table: &RawTable, name: &str) -> Result<usize, DataError> {
    table
        .column_index(name)
        .ok_or_else(|| DataError::MissingColumn(name.to_string()))
}

fn parse_cell(
    row: &[String],
    idx: usize,
    column: &str,
    row_number: usize,
) -> Result<Option<f64>, DataError> {
    let raw = row[idx].trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(DataError::Malformed {
            row: row_number,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
