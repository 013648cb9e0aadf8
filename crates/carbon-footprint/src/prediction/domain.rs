use serde::{Deserialize, Serialize};

use super::features::derivation;
use super::models::ModelFamily;

/// Survey answers exactly as the household submitted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub body_type: String,
    pub sex: String,
    pub diet: String,
    pub shower_frequency: String,
    pub heating_energy: String,
    /// Transport usage; zero means the household does not use a vehicle.
    pub transport: f64,
    pub vehicle_distance: f64,
    pub air_travel: String,
    pub social_activity: String,
    pub grocery_bill: f64,
    pub new_clothes: u32,
    pub tv_pc_hours: f64,
    pub internet_hours: f64,
    pub energy_efficiency: String,
    #[serde(default)]
    pub recycling: Vec<String>,
    pub waste_bag_size: f64,
    pub waste_bag_count: u32,
    #[serde(default)]
    pub cooking_methods: Vec<String>,
    pub city: String,
    pub area: String,
    /// Monthly electricity use in kWh when the household knows it.
    #[serde(default)]
    pub electricity: Option<f64>,
}

impl Submission {
    /// Reject answers the pipeline cannot turn into features without guessing.
    pub fn validate(&self) -> Result<(), InferenceError> {
        let categorical = [
            ("body_type", &self.body_type),
            ("sex", &self.sex),
            ("diet", &self.diet),
            ("shower_frequency", &self.shower_frequency),
            ("heating_energy", &self.heating_energy),
            ("air_travel", &self.air_travel),
            ("social_activity", &self.social_activity),
            ("energy_efficiency", &self.energy_efficiency),
            ("city", &self.city),
            ("area", &self.area),
        ];
        for (field, value) in categorical {
            if value.trim().is_empty() {
                return Err(InferenceError::MissingField { field });
            }
        }

        let numeric = [
            ("transport", self.transport),
            ("vehicle_distance", self.vehicle_distance),
            ("grocery_bill", self.grocery_bill),
            ("tv_pc_hours", self.tv_pc_hours),
            ("internet_hours", self.internet_hours),
            ("waste_bag_size", self.waste_bag_size),
        ];
        for (field, value) in numeric {
            check_quantity(field, value)?;
        }
        if let Some(electricity) = self.electricity {
            check_quantity("electricity", electricity)?;
        }

        Ok(())
    }
}

fn check_quantity(field: &'static str, value: f64) -> Result<(), InferenceError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(InferenceError::InvalidQuantity { field, value })
    }
}

/// Fields synthesized from categorical answers; computed once per submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub lpg_kg: f64,
    pub flights_hours: f64,
    pub meat_meals: u32,
    pub dining_out: u32,
    pub shopping_spend: f64,
    pub waste_kg: f64,
}

/// A validated submission with its derived fields attached. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSubmission {
    submission: Submission,
    derived: DerivedFields,
}

impl DerivedSubmission {
    pub fn new(submission: Submission) -> Result<Self, InferenceError> {
        submission.validate()?;
        let derived = derivation::derive_fields(&submission);
        Ok(Self {
            submission,
            derived,
        })
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn derived(&self) -> &DerivedFields {
        &self.derived
    }

    pub fn into_parts(self) -> (Submission, DerivedFields) {
        (self.submission, self.derived)
    }
}

/// Outcome of one prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_co2: f64,
    pub confidence: f64,
    pub model_used: ModelFamily,
}

/// Raised when a submission cannot be turned into a feature vector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("required field `{field}` is missing")]
    MissingField { field: &'static str },
    #[error("field `{field}` must be a finite, non-negative number (got {value})")]
    InvalidQuantity { field: &'static str, value: f64 },
    #[error("{model} produced a non-finite prediction")]
    NonFiniteOutput { model: ModelFamily },
}
