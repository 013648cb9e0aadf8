use carbon_footprint::prediction::{SubmissionId, SubmissionRecord, SubmissionStore, StoreError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local submission log; labelled records come back in submission order.
#[derive(Default, Clone)]
pub(crate) struct InMemorySubmissionStore {
    records: Arc<Mutex<BTreeMap<SubmissionId, SubmissionRecord>>>,
}

impl SubmissionStore for InMemorySubmissionStore {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, StoreError> {
        let mut guard = self.records.lock().expect("submission mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.id, record.clone());
        Ok(record)
    }

    fn record_actual(&self, id: SubmissionId, actual_co2: f64) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("submission mutex poisoned");
        let record = guard.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.actual_co2 = Some(actual_co2);
        Ok(())
    }

    fn labelled(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let guard = self.records.lock().expect("submission mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.actual_co2.is_some())
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().expect("submission mutex poisoned").len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_footprint::prediction::{FeatureDeriver, Submission};
    use chrono::Utc;

    fn record(id: u64) -> SubmissionRecord {
        let submission = Submission {
            body_type: "normal".to_string(),
            sex: "female".to_string(),
            diet: "vegan".to_string(),
            shower_frequency: "daily".to_string(),
            heating_energy: "electricity".to_string(),
            transport: 0.0,
            vehicle_distance: 0.0,
            air_travel: "never".to_string(),
            social_activity: "rarely".to_string(),
            grocery_bill: 120.0,
            new_clothes: 1,
            tv_pc_hours: 2.0,
            internet_hours: 3.0,
            energy_efficiency: "Yes".to_string(),
            recycling: vec!["Plastic".to_string()],
            waste_bag_size: 1.0,
            waste_bag_count: 1,
            cooking_methods: Vec::new(),
            city: "Kochi".to_string(),
            area: "Fort".to_string(),
            electricity: None,
        };

        SubmissionRecord {
            id: SubmissionId(id),
            submission: FeatureDeriver::derive(submission).expect("valid"),
            predicted_co2: 150.0,
            actual_co2: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_ids_conflict() {
        let store = InMemorySubmissionStore::default();
        store.insert(record(1)).expect("first insert");

        assert!(matches!(store.insert(record(1)), Err(StoreError::Conflict)));
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn only_labelled_records_feed_training() {
        let store = InMemorySubmissionStore::default();
        for id in 1..=3 {
            store.insert(record(id)).expect("insert");
        }
        store.record_actual(SubmissionId(2), 180.0).expect("known id");

        let labelled = store.labelled().expect("labelled");
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].id, SubmissionId(2));
        assert_eq!(labelled[0].actual_co2, Some(180.0));
        assert!(matches!(
            store.record_actual(SubmissionId(9), 1.0),
            Err(StoreError::NotFound)
        ));
    }
}
