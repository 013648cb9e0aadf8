use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::prediction::blender::EmissionFactors;
use crate::prediction::models::ModelHyperparameters;
use crate::prediction::trainer::TrainerConfig;
use crate::prediction::ModelFamily;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Training, retraining and blending settings for the prediction pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub retrain_threshold: u64,
    pub seed: u64,
    pub holdout_fraction: f64,
    pub emission_factors: EmissionFactors,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/carbon_emission.csv"),
            artifact_dir: PathBuf::from("models"),
            retrain_threshold: 20,
            seed: 42,
            holdout_fraction: 0.2,
            emission_factors: EmissionFactors::default(),
        }
    }
}

impl PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let dataset_path = env::var("CARBON_DATASET_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.dataset_path);
        let artifact_dir = env::var("CARBON_ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.artifact_dir);

        let retrain_threshold = match env::var("CARBON_RETRAIN_THRESHOLD") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|value| *value >= 1)
                .ok_or(ConfigError::InvalidValue {
                    key: "CARBON_RETRAIN_THRESHOLD",
                    value: raw,
                })?,
            Err(_) => defaults.retrain_threshold,
        };

        let seed = match env::var("CARBON_TRAINING_SEED") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "CARBON_TRAINING_SEED",
                    value: raw.clone(),
                })?,
            Err(_) => defaults.seed,
        };

        let holdout_fraction = match env::var("CARBON_HOLDOUT_FRACTION") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| *value > 0.0 && *value < 1.0)
                .ok_or(ConfigError::InvalidValue {
                    key: "CARBON_HOLDOUT_FRACTION",
                    value: raw,
                })?,
            Err(_) => defaults.holdout_fraction,
        };

        Ok(Self {
            dataset_path,
            artifact_dir,
            retrain_threshold,
            seed,
            holdout_fraction,
            emission_factors: defaults.emission_factors,
        })
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            families: ModelFamily::ALL.to_vec(),
            holdout_fraction: self.holdout_fraction,
            seed: self.seed,
            hyperparameters: ModelHyperparameters::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
