//! Reconciles model output with a physics baseline.
//!
//! The baseline is a weighted sum of conversion factors over the submission's answers and
//! derived fields. Model output is averaged with it and clamped to `[0.7b, 1.5b]`; outputs
//! far outside the baseline (`p > 3b` or `p < 0.3b`) are replaced by `1.1b` or `0.9b`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{DerivedSubmission, InferenceError, PredictionResult};
use super::features::FeatureDeriver;
use super::pool::ModelPool;

pub const MIN_CONFIDENCE: f64 = 0.6;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Conversion factors to kg CO2 per month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactors {
    pub vehicle_per_km: f64,
    pub flight_per_hour: f64,
    pub electricity_per_kwh: f64,
    /// Assumed draw of TV/PC use when electricity is unknown.
    pub tv_pc_kw: f64,
    pub days_per_month: f64,
    pub lpg_per_kg: f64,
    pub meat_per_meal: f64,
    pub dining_per_meal: f64,
    pub waste_per_kg: f64,
}

impl Default for EmissionFactors {
    fn default() -> Self {
        Self {
            vehicle_per_km: 0.21,
            flight_per_hour: 90.0,
            electricity_per_kwh: 0.45,
            tv_pc_kw: 0.1,
            days_per_month: 30.0,
            lpg_per_kg: 3.0,
            meat_per_meal: 2.5,
            dining_per_meal: 3.2,
            waste_per_kg: 0.5,
        }
    }
}

/// Which blending rule produced the final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendAdjustment {
    /// Baseline was zero; raw model output passed through.
    RawModel,
    Smoothed,
    ClampedLow,
    ClampedHigh,
    /// Model far above the baseline.
    CeilingOverride,
    /// Model far below the baseline.
    FloorOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendOutcome {
    pub value: f64,
    pub raw: f64,
    pub baseline: f64,
    pub adjustment: BlendAdjustment,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionBlender {
    factors: EmissionFactors,
}

impl PredictionBlender {
    pub fn new(factors: EmissionFactors) -> Self {
        Self { factors }
    }

    pub fn factors(&self) -> &EmissionFactors {
        &self.factors
    }

    pub fn baseline(&self, submission: &DerivedSubmission) -> f64 {
        let answers = submission.submission();
        let derived = submission.derived();
        let f = &self.factors;

        let mut total = 0.0;
        if answers.transport > 0.0 {
            total += answers.vehicle_distance * f.vehicle_per_km;
        }
        total += derived.flights_hours * f.flight_per_hour;

        let electricity_kwh = match answers.electricity {
            Some(kwh) if kwh > 0.0 => kwh,
            _ => answers.tv_pc_hours * f.tv_pc_kw * f.days_per_month,
        };
        total += electricity_kwh * f.electricity_per_kwh;

        total += derived.lpg_kg * f.lpg_per_kg;
        total += f64::from(derived.meat_meals) * f.meat_per_meal;
        total += f64::from(derived.dining_out) * f.dining_per_meal;
        total += derived.waste_kg * f.waste_per_kg;
        total
    }

    pub fn blend(raw: f64, baseline: f64) -> BlendOutcome {
        let (value, adjustment) = if baseline == 0.0 {
            (raw, BlendAdjustment::RawModel)
        } else if raw > 3.0 * baseline {
            (1.1 * baseline, BlendAdjustment::CeilingOverride)
        } else if raw < 0.3 * baseline {
            (0.9 * baseline, BlendAdjustment::FloorOverride)
        } else {
            let smoothed = 0.5 * raw + 0.5 * baseline;
            let (low, high) = (0.7 * baseline, 1.5 * baseline);
            if smoothed < low {
                (low, BlendAdjustment::ClampedLow)
            } else if smoothed > high {
                (high, BlendAdjustment::ClampedHigh)
            } else {
                (smoothed, BlendAdjustment::Smoothed)
            }
        };

        BlendOutcome {
            value,
            raw,
            baseline,
            adjustment,
        }
    }

    pub fn confidence(r2: f64) -> f64 {
        if r2.is_finite() {
            r2.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
        } else {
            MIN_CONFIDENCE
        }
    }

    /// Score `submission` with the pool's selected model and blend against the baseline.
    pub fn predict(
        &self,
        submission: &DerivedSubmission,
        pool: &ModelPool,
    ) -> Result<(PredictionResult, BlendOutcome), InferenceError> {
        let selected = pool.best_model();
        let features = FeatureDeriver::features(submission, pool.encoder());
        let raw = selected.predict(&features);
        let outcome = Self::blend(raw, self.baseline(submission));

        if !outcome.value.is_finite() {
            return Err(InferenceError::NonFiniteOutput {
                model: pool.best(),
            });
        }

        if matches!(
            outcome.adjustment,
            BlendAdjustment::CeilingOverride | BlendAdjustment::FloorOverride
        ) {
            debug!(
                model = %pool.best(),
                raw,
                baseline = outcome.baseline,
                adjustment = ?outcome.adjustment,
                "guardrail replaced model output"
            );
        }

        let result = PredictionResult {
            predicted_co2: outcome.value,
            confidence: Self::confidence(selected.metrics.r2),
            model_used: pool.best(),
        };
        Ok((result, outcome))
    }
}
