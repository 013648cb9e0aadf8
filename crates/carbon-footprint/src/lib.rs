//! Household carbon footprint estimation: survey feature derivation, competing regression
//! models, baseline blending and submission-driven retraining.

pub mod config;
pub mod error;
pub mod prediction;
pub mod telemetry;
