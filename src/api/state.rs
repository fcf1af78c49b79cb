use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::domain::PeriodRecord;
use crate::ml::ModelRegistry;
use crate::pipeline::{build_feature_table, FeatureTable, PipelineError};

/// Records uploaded for one building together with their feature table
#[derive(Debug)]
pub struct Dataset {
    pub records: Vec<PeriodRecord>,
    pub table: FeatureTable,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn build(records: Vec<PeriodRecord>) -> Result<Self, PipelineError> {
        let table = build_feature_table(&records)?;
        Ok(Self {
            records,
            table,
            loaded_at: Utc::now(),
        })
    }
}

/// Shared handler state. Datasets and models are keyed by building id.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    datasets: Arc<RwLock<HashMap<String, Arc<Dataset>>>>,
    pub models: ModelRegistry,
}

impl AppState {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg: Arc::new(cfg),
            datasets: Arc::new(RwLock::new(HashMap::new())),
            models: ModelRegistry::new(),
        }
    }

    pub async fn dataset(&self, building_id: &str) -> Option<Arc<Dataset>> {
        self.datasets.read().await.get(building_id).cloned()
    }

    /// Replace the dataset for `building_id`. Any model trained on the old
    /// records stays registered until retrained.
    pub async fn put_dataset(&self, building_id: impl Into<String>, dataset: Dataset) -> Arc<Dataset> {
        let building_id = building_id.into();
        let dataset = Arc::new(dataset);
        info!(
            building_id = %building_id,
            records = dataset.records.len(),
            "dataset stored"
        );
        self.datasets
            .write()
            .await
            .insert(building_id, Arc::clone(&dataset));
        dataset
    }

    /// Add `incoming` to the records of `building_id` and rebuild. The write
    /// lock is held throughout, so concurrent appends never drop each other's
    /// records. On error the stored dataset is left unchanged.
    pub async fn append_records(
        &self,
        building_id: impl Into<String>,
        incoming: Vec<PeriodRecord>,
    ) -> Result<Arc<Dataset>, PipelineError> {
        let building_id = building_id.into();
        let mut datasets = self.datasets.write().await;

        let mut records = datasets
            .get(&building_id)
            .map(|existing| existing.records.clone())
            .unwrap_or_default();
        let appended = incoming.len();
        records.extend(incoming);
        let dataset = Arc::new(Dataset::build(records)?);

        info!(
            building_id = %building_id,
            appended,
            records = dataset.records.len(),
            "records appended"
        );
        datasets.insert(building_id, Arc::clone(&dataset));
        Ok(dataset)
    }

    pub async fn remove_dataset(&self, building_id: &str) -> bool {
        let removed = self.datasets.write().await.remove(building_id).is_some();
        if removed {
            self.models.unregister(building_id).await;
        }
        removed
    }

    pub async fn building_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.datasets.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn dataset_count(&self) -> usize {
        self.datasets.read().await.len()
    }
}
