use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use super::features::CategoryEncoder;
use super::models::ModelFamily;
use super::selector::{ModelSelector, SelectionError};
use super::trainer::{FamilyMetrics, TrainedModel};

/// Immutable snapshot of every successfully trained family plus the selected best.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPool {
    models: BTreeMap<ModelFamily, TrainedModel>,
    best: ModelFamily,
    encoder: CategoryEncoder,
    trained_at: DateTime<Utc>,
}

impl ModelPool {
    /// Run selection over `models`; an empty map yields [`SelectionError::EmptyPool`].
    pub fn assemble(
        models: BTreeMap<ModelFamily, TrainedModel>,
        encoder: CategoryEncoder,
        trained_at: DateTime<Utc>,
    ) -> Result<Self, SelectionError> {
        let best = ModelSelector::select(
            models
                .iter()
                .map(|(family, trained)| (*family, &trained.metrics)),
        )?;

        Ok(Self {
            models,
            best,
            encoder,
            trained_at,
        })
    }

    pub fn best(&self) -> ModelFamily {
        self.best
    }

    pub fn best_model(&self) -> &TrainedModel {
        &self.models[&self.best]
    }

    pub fn get(&self, family: ModelFamily) -> Option<&TrainedModel> {
        self.models.get(&family)
    }

    pub fn models(&self) -> &BTreeMap<ModelFamily, TrainedModel> {
        &self.models
    }

    pub fn families(&self) -> impl Iterator<Item = ModelFamily> + '_ {
        self.models.keys().copied()
    }

    pub fn encoder(&self) -> &CategoryEncoder {
        &self.encoder
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn performance(&self) -> BTreeMap<ModelFamily, FamilyMetrics> {
        self.models
            .iter()
            .map(|(family, trained)| (*family, trained.metrics.clone()))
            .collect()
    }
}

/// Holder of the live pool. Readers clone the `Arc` and keep using that snapshot even
/// while a newer pool is installed.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<ModelPool>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<ModelPool>> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Swap in a new pool, returning the one it replaced.
    pub fn install(&self, pool: impl Into<Arc<ModelPool>>) -> Option<Arc<ModelPool>> {
        let pool = pool.into();
        let best = pool.best();
        let families = pool.models().len();
        let previous = self.current.write().replace(pool);
        info!(best_model = %best, families, "model pool installed");
        previous
    }
}
