//! Model Registry
//!
//! Holds trained models keyed by building id. Each model owns its scaler and
//! weights, so models for different buildings never share state. The registry
//! is owned by its caller; there is no process-wide instance.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{ForecastHorizon, ModelError, TrainedModel};

#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: Arc<RwLock<HashMap<String, Arc<TrainedModel>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any previous one for `building_id`
    pub async fn register(&self, building_id: impl Into<String>, model: TrainedModel) -> Arc<TrainedModel> {
        let building_id = building_id.into();
        let model = Arc::new(model);
        info!(building_id = %building_id, model_id = %model.metadata().model_id, "model registered");
        self.models
            .write()
            .await
            .insert(building_id, Arc::clone(&model));
        model
    }

    pub async fn get(&self, building_id: &str) -> Option<Arc<TrainedModel>> {
        self.models.read().await.get(building_id).cloned()
    }

    /// List all registered building ids, sorted
    pub async fn building_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn unregister(&self, building_id: &str) -> bool {
        self.models.write().await.remove(building_id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.models.read().await.len()
    }

    /// Forecast with the model registered for `building_id`
    pub async fn forecast(
        &self,
        building_id: &str,
        seed: &[Vec<f64>],
        steps: usize,
    ) -> Result<ForecastHorizon, ModelError> {
        let model = self.get(building_id).await.ok_or(ModelError::UntrainedModel)?;
        model.forecast_horizon(seed, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::fixtures::record;
    use crate::ml::ModelConfig;
    use crate::pipeline::build_feature_table;

    fn trained(load: f64) -> TrainedModel {
        let records: Vec<_> = (0..30)
            .map(|h| record(&format!("2024-03-{:02}T{:02}:00:00", 1 + h / 24, h % 24), load + h as f64))
            .collect();
        let table = build_feature_table(&records).unwrap();
        let config = ModelConfig {
            lstm_units: 4,
            epochs: 1,
            sequence_length: 4,
            feature_columns: vec!["total_consumption".into()],
            ..ModelConfig::default()
        };
        TrainedModel::fit(&table, &config).unwrap()
    }

    #[tokio::test]
    async fn test_model_registry() {
        let registry = ModelRegistry::new();

        // Initially empty
        assert_eq!(registry.count().await, 0);
        assert!(registry.get("north").await.is_none());

        registry.register("north", trained(100.0)).await;
        registry.register("south", trained(5000.0)).await;
        assert_eq!(registry.count().await, 2);
        assert_eq!(registry.building_ids().await, vec!["north", "south"]);

        let north = registry.get("north").await.unwrap();
        let south = registry.get("south").await.unwrap();
        assert_ne!(north.scaler(), south.scaler());

        assert!(registry.unregister("north").await);
        assert!(!registry.unregister("north").await);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_forecast_unknown_building() {
        let registry = ModelRegistry::new();
        let result = registry.forecast("nowhere", &vec![vec![1.0]; 4], 2).await;
        assert!(matches!(result, Err(ModelError::UntrainedModel)));

        registry.register("east", trained(200.0)).await;
        let horizon = registry.forecast("east", &vec![vec![210.0]; 4], 3).await.unwrap();
        assert_eq!(horizon.predictions.len(), 3);
    }
}
