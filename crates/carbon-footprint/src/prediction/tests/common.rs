use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::response::Response;
use ndarray::{Array1, Array2};
use serde_json::Value;

use crate::prediction::dataset::{dataset_row as to_dataset_row, schema_columns};
use crate::prediction::models::{
    fit_family, BoostingParams, ForestParams, ModelHyperparameters, NeuralParams,
};
use crate::prediction::{
    ArtifactError, ArtifactStore, DerivedSubmission, FamilyMetrics, FeatureDeriver, ModelFamily,
    ModelPool, PredictionBlender, PredictionService, RawTable, StoreError, Submission,
    SubmissionId, SubmissionRecord, SubmissionStore, TrainedModel, Trainer, TrainerConfig,
};

pub(crate) fn vegetarian_submission() -> Submission {
    Submission {
        body_type: "normal".to_string(),
        sex: "female".to_string(),
        diet: "vegetarian".to_string(),
        shower_frequency: "daily".to_string(),
        heating_energy: "electricity".to_string(),
        transport: 1.0,
        vehicle_distance: 1000.0,
        air_travel: "never".to_string(),
        social_activity: "rarely".to_string(),
        grocery_bill: 200.0,
        new_clothes: 2,
        tv_pc_hours: 4.0,
        internet_hours: 5.0,
        energy_efficiency: "Yes".to_string(),
        recycling: vec!["Paper".to_string()],
        waste_bag_size: 1.0,
        waste_bag_count: 2,
        cooking_methods: Vec::new(),
        city: "Mumbai".to_string(),
        area: "Bandra".to_string(),
        electricity: None,
    }
}

pub(crate) fn omnivore_submission() -> Submission {
    Submission {
        body_type: "overweight".to_string(),
        sex: "male".to_string(),
        diet: "omnivore".to_string(),
        shower_frequency: "twice a day".to_string(),
        heating_energy: "coal".to_string(),
        transport: 2.0,
        vehicle_distance: 1800.0,
        air_travel: "frequently".to_string(),
        social_activity: "often".to_string(),
        grocery_bill: 250.0,
        new_clothes: 6,
        tv_pc_hours: 9.0,
        internet_hours: 6.0,
        energy_efficiency: "Sometimes".to_string(),
        recycling: Vec::new(),
        waste_bag_size: 2.0,
        waste_bag_count: 4,
        cooking_methods: vec!["Stove".to_string(), "Oven".to_string()],
        city: "Pune".to_string(),
        area: "Kothrud".to_string(),
        electricity: Some(320.0),
    }
}

const DIETS: [&str; 4] = ["vegan", "vegetarian", "pescatarian", "omnivore"];
const AIR_TRAVEL: [&str; 4] = ["never", "rarely", "frequently", "very frequently"];
const SOCIAL: [&str; 4] = ["never", "rarely", "often", "very often"];
const EFFICIENCY: [&str; 3] = ["Yes", "Sometimes", "No"];
const BODY_TYPES: [&str; 4] = ["underweight", "normal", "overweight", "obese"];
const HEATING: [&str; 4] = ["electricity", "natural gas", "wood", "coal"];
const SHOWERS: [&str; 3] = ["daily", "less frequently", "twice a day"];

/// Deterministic, varied household used to build synthetic training tables.
pub(crate) fn synthetic_submission(idx: usize) -> Submission {
    let cooking = ["Stove", "Oven", "Grill"]
        .iter()
        .take(idx % 4)
        .map(|method| method.to_string())
        .collect();

    Submission {
        body_type: BODY_TYPES[idx % BODY_TYPES.len()].to_string(),
        sex: if idx % 2 == 0 { "female" } else { "male" }.to_string(),
        diet: DIETS[idx % DIETS.len()].to_string(),
        shower_frequency: SHOWERS[idx % SHOWERS.len()].to_string(),
        heating_energy: HEATING[(idx / 2) % HEATING.len()].to_string(),
        transport: (idx % 3) as f64,
        vehicle_distance: ((idx * 137) % 2000) as f64,
        air_travel: AIR_TRAVEL[(idx / 3) % AIR_TRAVEL.len()].to_string(),
        social_activity: SOCIAL[(idx / 4) % SOCIAL.len()].to_string(),
        grocery_bill: 60.0 + ((idx * 53) % 300) as f64,
        new_clothes: (idx % 9) as u32,
        tv_pc_hours: (idx % 11) as f64,
        internet_hours: ((idx * 7) % 13) as f64,
        energy_efficiency: EFFICIENCY[idx % EFFICIENCY.len()].to_string(),
        recycling: Vec::new(),
        waste_bag_size: 1.0,
        waste_bag_count: 1 + (idx % 5) as u32,
        cooking_methods: cooking,
        city: "Mumbai".to_string(),
        area: "Andheri".to_string(),
        electricity: None,
    }
}

/// Realized emission for a synthetic household: the physics baseline plus a
/// lifestyle-dependent offset the models have to learn.
pub(crate) fn synthetic_target(idx: usize) -> f64 {
    let derived = DerivedSubmission::new(synthetic_submission(idx)).expect("synthetic is valid");
    let baseline = PredictionBlender::default().baseline(&derived);
    baseline * 1.05 + f64::from(derived.submission().new_clothes) * 4.0 + 40.0
}

pub(crate) fn dataset_columns() -> Vec<String> {
    schema_columns()
}

pub(crate) fn dataset_row(idx: usize) -> BTreeMap<&'static str, String> {
    let derived = DerivedSubmission::new(synthetic_submission(idx)).expect("synthetic is valid");
    to_dataset_row(&FeatureDeriver::raw_features(&derived), synthetic_target(idx))
}

pub(crate) fn labelled_table(rows: usize) -> RawTable {
    let mut table = RawTable::new(dataset_columns());
    for idx in 0..rows {
        table.push_named(&dataset_row(idx));
    }
    table
}

pub(crate) fn fast_hyperparameters() -> ModelHyperparameters {
    ModelHyperparameters {
        forest: ForestParams {
            n_trees: 12,
            max_depth: 6,
            ..ForestParams::default()
        },
        boosting: BoostingParams {
            rounds: 25,
            max_depth: 3,
            ..BoostingParams::default()
        },
        neural: NeuralParams {
            hidden_layers: vec![16, 8],
            learning_rate: 0.01,
            batch_size: 16,
            epochs: 30,
            min_training_rows: 32,
        },
    }
}

pub(crate) fn fast_trainer_config() -> TrainerConfig {
    TrainerConfig {
        hyperparameters: fast_hyperparameters(),
        ..TrainerConfig::default()
    }
}

/// Cheap fitted model of `family` with fixed recorded metrics.
pub(crate) fn trained_model(family: ModelFamily, r2: f64, mae: f64) -> TrainedModel {
    let width = crate::prediction::features::FEATURE_COUNT;
    let x = Array2::from_shape_fn((8, width), |(i, _)| i as f64);
    let y = Array1::from_shape_fn(8, |i| 100.0 + i as f64 * 10.0);
    let params = ModelHyperparameters {
        forest: ForestParams {
            n_trees: 2,
            ..ForestParams::default()
        },
        boosting: BoostingParams {
            rounds: 2,
            ..BoostingParams::default()
        },
        neural: NeuralParams {
            hidden_layers: vec![4],
            epochs: 2,
            batch_size: 4,
            min_training_rows: 1,
            ..NeuralParams::default()
        },
    };

    TrainedModel {
        model: fit_family(family, x.view(), y.view(), &params, 1).expect("tiny fit succeeds"),
        metrics: FamilyMetrics {
            mae,
            r2,
            feature_importance: None,
        },
    }
}

pub(crate) type TestService = PredictionService<MemorySubmissionStore, RawTable, MemoryArtifactStore>;

pub(crate) fn build_service(
    rows: usize,
    threshold: u64,
) -> (
    Arc<TestService>,
    Arc<MemorySubmissionStore>,
    Arc<MemoryArtifactStore>,
) {
    service_with(
        labelled_table(rows),
        MemoryArtifactStore::default(),
        fast_trainer_config(),
        threshold,
    )
}

/// Service restoring `pool` at start-up whose trainer only knows the network family.
pub(crate) fn build_network_only_service(
    pool: ModelPool,
    rows: usize,
    threshold: u64,
) -> (
    Arc<TestService>,
    Arc<MemorySubmissionStore>,
    Arc<MemoryArtifactStore>,
) {
    let config = TrainerConfig {
        families: vec![ModelFamily::NeuralNetwork],
        ..fast_trainer_config()
    };
    service_with(
        labelled_table(rows),
        MemoryArtifactStore::with_pool(pool),
        config,
        threshold,
    )
}

pub(crate) fn service_with(
    dataset: RawTable,
    artifacts: MemoryArtifactStore,
    config: TrainerConfig,
    threshold: u64,
) -> (
    Arc<TestService>,
    Arc<MemorySubmissionStore>,
    Arc<MemoryArtifactStore>,
) {
    let store = Arc::new(MemorySubmissionStore::default());
    let artifacts = Arc::new(artifacts);
    let service = PredictionService::with_components(
        store.clone(),
        Arc::new(dataset),
        artifacts.clone(),
        Trainer::new(config),
        PredictionBlender::default(),
        threshold,
    );
    (Arc::new(service), store, artifacts)
}

/// Pool trained the same way the test services train at start-up.
pub(crate) fn trained_pool(rows: usize) -> ModelPool {
    Trainer::new(fast_trainer_config())
        .train_table(&labelled_table(rows))
        .expect("dataset is valid")
        .into_pool()
        .expect("pool")
}

/// Table that parses but lacks every feature column.
pub(crate) fn headerless_table() -> RawTable {
    let mut table = RawTable::new(vec!["Diet".to_string(), "CarbonEmission".to_string()]);
    let mut row = BTreeMap::new();
    row.insert("Diet", "vegan".to_string());
    row.insert("CarbonEmission", "1200".to_string());
    table.push_named(&row);
    table
}

pub(crate) async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

#[derive(Default, Clone)]
pub(crate) struct MemorySubmissionStore {
    records: Arc<Mutex<Vec<SubmissionRecord>>>,
}

impl MemorySubmissionStore {
    pub(crate) fn records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().expect("store mutex poisoned").clone()
    }
}

impl SubmissionStore for MemorySubmissionStore {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.iter().any(|existing| existing.id == record.id) {
            return Err(StoreError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn record_actual(&self, id: SubmissionId, actual_co2: f64) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let record = guard
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::NotFound)?;
        record.actual_co2 = Some(actual_co2);
        Ok(())
    }

    fn labelled(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| record.actual_co2.is_some())
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().expect("store mutex poisoned").len())
    }
}

pub(crate) struct UnavailableStore;

impl SubmissionStore for UnavailableStore {
    fn insert(&self, _record: SubmissionRecord) -> Result<SubmissionRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn record_actual(&self, _id: SubmissionId, _actual_co2: f64) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn labelled(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn count(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(crate) struct MemoryArtifactStore {
    saved: Mutex<Option<ModelPool>>,
    saves: AtomicUsize,
}

impl MemoryArtifactStore {
    pub(crate) fn with_pool(pool: ModelPool) -> Self {
        Self {
            saved: Mutex::new(Some(pool)),
            saves: AtomicUsize::new(0),
        }
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn load_pool(&self) -> ModelPool {
        self.saved
            .lock()
            .expect("artifact mutex poisoned")
            .clone()
            .expect("a pool was saved")
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, pool: &ModelPool) -> Result<(), ArtifactError> {
        *self.saved.lock().expect("artifact mutex poisoned") = Some(pool.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<ModelPool>, ArtifactError> {
        Ok(self.saved.lock().expect("artifact mutex poisoned").clone())
    }
}
