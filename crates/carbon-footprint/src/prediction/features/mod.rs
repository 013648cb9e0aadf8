//! Feature derivation shared by training and inference.
//!
//! Every model sees the same fixed-width vector: categorical codes, raw and derived
//! quantities, then engineered interaction and score features. Training rows and live
//! submissions both pass through [`FeatureDeriver::vectorize`], which keeps the two paths
//! in lockstep.

pub(crate) mod derivation;
mod encoder;

pub use encoder::{CategoryEncoder, UNSEEN_CATEGORY_CODE};

use serde::Serialize;

use super::domain::{DerivedSubmission, InferenceError, Submission};

/// Revision of the derivation rules; bump when any rule or column changes.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Placeholder label for categorical answers missing from the training dataset.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Feature name paired with the dataset column it is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureColumn {
    pub name: &'static str,
    pub dataset_column: &'static str,
}

const fn column(name: &'static str, dataset_column: &'static str) -> FeatureColumn {
    FeatureColumn {
        name,
        dataset_column,
    }
}

pub const CATEGORICAL_FEATURES: [FeatureColumn; 8] = [
    column("body_type", "Body Type"),
    column("sex", "Sex"),
    column("diet", "Diet"),
    column("shower_frequency", "How Often Shower"),
    column("heating_energy", "Heating Energy Source"),
    column("social_activity", "Social Activity"),
    column("air_travel", "Frequency of Traveling by Air"),
    column("energy_efficiency", "Energy efficiency"),
];

pub const NUMERIC_FEATURES: [FeatureColumn; 12] = [
    column("grocery_bill", "Monthly Grocery Bill"),
    column("vehicle_distance", "Vehicle Monthly Distance Km"),
    column("waste_bag_count", "Waste Bag Weekly Count"),
    column("tv_pc_hours", "How Long TV PC Daily Hour"),
    column("new_clothes", "How Many New Clothes Monthly"),
    column("internet_hours", "How Long Internet Daily Hour"),
    column("lpg_kg", "lpg_kg"),
    column("flights_hours", "flights_hours"),
    column("meat_meals", "meat_meals"),
    column("dining_out", "dining_out"),
    column("shopping_spend", "shopping_spend"),
    column("waste_kg", "waste_kg"),
];

pub const ENGINEERED_FEATURES: [&str; 5] = [
    "grocery_meat_interaction",
    "energy_tech_interaction",
    "waste_efficiency",
    "energy_efficiency_score",
    "lifestyle_score",
];

pub const FEATURE_COUNT: usize =
    CATEGORICAL_FEATURES.len() + NUMERIC_FEATURES.len() + ENGINEERED_FEATURES.len();

/// Dataset column holding the realized monthly CO2 value.
pub const TARGET_COLUMN: &str = "CarbonEmission";

const ENERGY_EFFICIENCY: usize = 7;

const GROCERY_BILL: usize = 0;
const WASTE_BAG_COUNT: usize = 2;
const TV_PC_HOURS: usize = 3;
const NEW_CLOTHES: usize = 4;
const INTERNET_HOURS: usize = 5;
const MEAT_MEALS: usize = 8;

/// Feature names in vector order.
pub fn feature_names() -> impl Iterator<Item = &'static str> {
    CATEGORICAL_FEATURES
        .iter()
        .map(|column| column.name)
        .chain(NUMERIC_FEATURES.iter().map(|column| column.name))
        .chain(ENGINEERED_FEATURES.iter().copied())
}

/// Unencoded inputs in schema order, before category codes and engineered features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeatures {
    pub categorical: [String; 8],
    pub numeric: [f64; 12],
}

/// Ordered feature-name to value mapping consumed by the models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_names()
            .position(|candidate| candidate == name)
            .map(|idx| self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        feature_names().zip(self.values.iter().copied())
    }
}

/// Entry point for turning survey answers into model inputs.
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Validate a submission and attach its derived fields.
    pub fn derive(submission: Submission) -> Result<DerivedSubmission, InferenceError> {
        DerivedSubmission::new(submission)
    }

    pub fn raw_features(submission: &DerivedSubmission) -> RawFeatures {
        let answers = submission.submission();
        let derived = submission.derived();

        RawFeatures {
            categorical: [
                answers.body_type.clone(),
                answers.sex.clone(),
                answers.diet.clone(),
                answers.shower_frequency.clone(),
                answers.heating_energy.clone(),
                answers.social_activity.clone(),
                answers.air_travel.clone(),
                answers.energy_efficiency.clone(),
            ],
            numeric: [
                answers.grocery_bill,
                answers.vehicle_distance,
                f64::from(answers.waste_bag_count),
                answers.tv_pc_hours,
                f64::from(answers.new_clothes),
                answers.internet_hours,
                derived.lpg_kg,
                derived.flights_hours,
                f64::from(derived.meat_meals),
                f64::from(derived.dining_out),
                derived.shopping_spend,
                derived.waste_kg,
            ],
        }
    }

    /// Encode categories and append engineered features.
    pub fn vectorize(raw: &RawFeatures, encoder: &CategoryEncoder) -> FeatureVector {
        let mut values = Vec::with_capacity(FEATURE_COUNT);

        for (column, label) in CATEGORICAL_FEATURES.iter().zip(raw.categorical.iter()) {
            values.push(encoder.code(column.name, label));
        }
        values.extend_from_slice(&raw.numeric);

        let numeric = &raw.numeric;
        values.push(numeric[GROCERY_BILL] * numeric[MEAT_MEALS]);
        values.push(numeric[TV_PC_HOURS] * numeric[INTERNET_HOURS]);
        values.push(numeric[WASTE_BAG_COUNT] / 5.0);
        values.push(energy_efficiency_score(&raw.categorical[ENERGY_EFFICIENCY]));
        values.push(numeric[TV_PC_HOURS] + numeric[INTERNET_HOURS] + numeric[NEW_CLOTHES]);

        FeatureVector { values }
    }

    pub fn features(
        submission: &DerivedSubmission,
        encoder: &CategoryEncoder,
    ) -> FeatureVector {
        Self::vectorize(&Self::raw_features(submission), encoder)
    }
}

/// Answers outside Yes/Sometimes/No score 0.
fn energy_efficiency_score(answer: &str) -> f64 {
    match answer.trim().to_ascii_lowercase().as_str() {
        "yes" => 3.0,
        "sometimes" => 2.0,
        "no" => 1.0,
        _ => 0.0,
    }
}
