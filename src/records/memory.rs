//! In-process record store, used when the external store is disabled

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ClassificationRecord, FeedbackRecord, RecordStore, RecordStoreError, WeightsPayload};

#[derive(Default)]
pub struct InMemoryRecordStore {
    classifications: RwLock<HashMap<String, ClassificationRecord>>,
    feedback: RwLock<Vec<FeedbackRecord>>,
    weights: RwLock<Option<WeightsPayload>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn feedback_records(&self) -> Vec<FeedbackRecord> {
        self.feedback.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_classification(&self, id: &str) -> Result<ClassificationRecord, RecordStoreError> {
        self.classifications
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RecordStoreError::NotFound(id.to_string()))
    }

    async fn store_classification(&self, record: &ClassificationRecord) -> Result<(), RecordStoreError> {
        self.classifications
            .write()
            .await
            .insert(record.classification_id.clone(), record.clone());
        Ok(())
    }

    async fn store_feedback(&self, feedback: &FeedbackRecord) -> Result<(), RecordStoreError> {
        self.feedback.write().await.push(feedback.clone());
        Ok(())
    }

    async fn update_weights(&self, payload: &WeightsPayload) -> Result<(), RecordStoreError> {
        *self.weights.write().await = Some(payload.clone());
        Ok(())
    }

    async fn get_weights(&self) -> Result<Option<WeightsPayload>, RecordStoreError> {
        Ok(self.weights.read().await.clone())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = InMemoryRecordStore::new();
        assert!(matches!(
            store.get_classification("missing").await,
            Err(RecordStoreError::NotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_weights_round_trip() {
        let store = InMemoryRecordStore::new();
        assert!(store.get_weights().await.unwrap().is_none());
        let payload = WeightsPayload::from_config(&ClassifierConfig::default());
        store.update_weights(&payload).await.unwrap();
        assert_eq!(store.get_weights().await.unwrap(), Some(payload));
    }
}
