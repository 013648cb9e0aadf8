//! Per-family model persistence so a restart can resume without retraining.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::features::{CategoryEncoder, FEATURE_SCHEMA_VERSION};
use super::models::{FittedModel, ModelFamily};
use super::pool::ModelPool;
use super::selector::SelectionError;
use super::trainer::{FamilyMetrics, TrainedModel};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact io failed: {0}")]
    Io(#[from] io::Error),
    #[error("artifact is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{family} artifact uses feature schema v{found}, expected v{expected}")]
    SchemaMismatch {
        family: ModelFamily,
        found: u32,
        expected: u32,
    },
    #[error("artifact {path} holds a {found} model")]
    FamilyMismatch { path: PathBuf, found: ModelFamily },
    #[error("{family} artifact was written by a different training cycle ({found}, expected {expected})")]
    MixedCycles {
        family: ModelFamily,
        found: DateTime<Utc>,
        expected: DateTime<Utc>,
    },
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Persistence collaborator for trained pools.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, pool: &ModelPool) -> Result<(), ArtifactError>;
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<ModelPool>, ArtifactError>;
}

#[derive(Serialize)]
struct FamilyArtifactRef<'a> {
    schema_version: u32,
    trained_at: DateTime<Utc>,
    encoder: &'a CategoryEncoder,
    metrics: &'a FamilyMetrics,
    model: &'a FittedModel,
}

#[derive(Deserialize)]
struct FamilyArtifact {
    schema_version: u32,
    trained_at: DateTime<Utc>,
    encoder: CategoryEncoder,
    metrics: FamilyMetrics,
    model: FittedModel,
}

/// Writes one `<family>.json` blob per trained family into a directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, family: ModelFamily) -> PathBuf {
        self.dir.join(format!("{}.json", family.as_str()))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, pool: &ModelPool) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir)?;

        for (family, trained) in pool.models() {
            let artifact = FamilyArtifactRef {
                schema_version: FEATURE_SCHEMA_VERSION,
                trained_at: pool.trained_at(),
                encoder: pool.encoder(),
                metrics: &trained.metrics,
                model: &trained.model,
            };
            let path = self.path_for(*family);
            let staging = path.with_extension("json.tmp");
            fs::write(&staging, serde_json::to_vec(&artifact)?)?;
            fs::rename(&staging, &path)?;
            debug!(family = %family, path = %path.display(), "model artifact written");
        }

        // Families that failed this cycle must not resurface on restore.
        for family in ModelFamily::ALL {
            if pool.get(family).is_none() {
                match fs::remove_file(self.path_for(family)) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        info!(dir = %self.dir.display(), families = pool.models().len(), "model artifacts saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<ModelPool>, ArtifactError> {
        let mut models = BTreeMap::new();
        let mut shared: Option<(CategoryEncoder, DateTime<Utc>)> = None;

        for family in ModelFamily::ALL {
            let path = self.path_for(family);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            let artifact: FamilyArtifact = serde_json::from_slice(&bytes)?;
            if artifact.schema_version != FEATURE_SCHEMA_VERSION {
                return Err(ArtifactError::SchemaMismatch {
                    family,
                    found: artifact.schema_version,
                    expected: FEATURE_SCHEMA_VERSION,
                });
            }
            if artifact.model.family() != family {
                return Err(ArtifactError::FamilyMismatch {
                    path,
                    found: artifact.model.family(),
                });
            }

            // Every blob of one save carries the pool's timestamp and encoder.
            match &shared {
                Some((encoder, trained_at))
                    if *trained_at != artifact.trained_at || *encoder != artifact.encoder =>
                {
                    return Err(ArtifactError::MixedCycles {
                        family,
                        found: artifact.trained_at,
                        expected: *trained_at,
                    });
                }
                Some(_) => {}
                None => shared = Some((artifact.encoder, artifact.trained_at)),
            }

            models.insert(
                family,
                TrainedModel {
                    model: artifact.model,
                    metrics: artifact.metrics,
                },
            );
        }

        let Some((encoder, trained_at)) = shared else {
            return Ok(None);
        };
        let pool = ModelPool::assemble(models, encoder, trained_at)?;
        info!(best_model = %pool.best(), families = pool.models().len(), "model artifacts restored");
        Ok(Some(pool))
    }
}
