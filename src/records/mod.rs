//! External record store
//!
//! Durable history of classifications and corrections, plus a shared copy
//! of the learned weights. Every call is fallible and time-bounded; only a
//! failed classification lookup is fatal to a feedback request.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ClassifierConfig, ThresholdSet, WeightSet};
use crate::scoring::{Classification, FeatureSnapshot};
use crate::types::{ClassScores, DocumentClass, UserConfidence};

pub use http::HttpRecordStore;
pub use memory::InMemoryRecordStore;

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("classification {0} not found")]
    NotFound(String),

    #[error("record store request failed: {0}")]
    Transport(String),

    #[error("record store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid record store response: {0}")]
    Decode(String),
}

impl RecordStoreError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            RecordStoreError::Transport(_) => true,
            RecordStoreError::Status { status, .. } => *status >= 500,
            RecordStoreError::NotFound(_) | RecordStoreError::Decode(_) => false,
        }
    }
}

/// Prediction part of a stored classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub class: DocumentClass,
    pub confidence: f64,
    pub scores: ClassScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub classification_id: String,
    pub timestamp: DateTime<Utc>,
    pub prediction: PredictionRecord,
    #[serde(default)]
    pub features: FeatureSnapshot,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub weights_version: u64,
}

impl ClassificationRecord {
    pub fn new(
        classification_id: impl Into<String>,
        classification: &Classification,
        features: FeatureSnapshot,
        model_version: impl Into<String>,
        weights_version: u64,
    ) -> Self {
        Self {
            classification_id: classification_id.into(),
            timestamp: Utc::now(),
            prediction: PredictionRecord {
                class: classification.predicted_class,
                confidence: classification.confidence,
                scores: classification.scores,
            },
            features,
            model_version: model_version.into(),
            weights_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCorrection {
    pub corrected_class: DocumentClass,
    pub user_confidence: UserConfidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub classification_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_correction: UserCorrection,
}

/// Weights and thresholds as exchanged with the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsPayload {
    pub weights: WeightSet,
    pub thresholds: ThresholdSet,
    #[serde(default)]
    pub version: String,
}

impl WeightsPayload {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            thresholds: config.thresholds.clone(),
            version: config.version.clone(),
        }
    }

    /// Configuration patch carrying the weights and thresholds
    pub fn to_patch(&self) -> serde_json::Value {
        serde_json::json!({
            "weights": self.weights,
            "thresholds": self.thresholds,
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a stored classification; `NotFound` if the id is unknown
    async fn get_classification(&self, id: &str) -> Result<ClassificationRecord, RecordStoreError>;

    async fn store_classification(&self, record: &ClassificationRecord) -> Result<(), RecordStoreError>;

    async fn store_feedback(&self, feedback: &FeedbackRecord) -> Result<(), RecordStoreError>;

    /// Push the current weights and thresholds
    async fn update_weights(&self, payload: &WeightsPayload) -> Result<(), RecordStoreError>;

    /// Latest shared weights, `None` when none have been stored
    async fn get_weights(&self) -> Result<Option<WeightsPayload>, RecordStoreError>;

    async fn health_check(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_record_wire_shape() {
        let raw = r#"{
            "classification_id": "abc",
            "timestamp": "2024-05-01T10:00:00Z",
            "prediction": {"class": "document", "confidence": 0.25, "scores": {"DOC": 2.0, "PHOTO": 0.5}}
        }"#;
        let record: ClassificationRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.prediction.class, DocumentClass::Document);
        assert_eq!(record.prediction.scores.document, 2.0);
        assert!(record.features.is_empty());
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let raw = r#"{
            "classification_id": "abc",
            "timestamp": "2024-05-01T10:00:00Z",
            "prediction": {"class": "invoice", "confidence": 0.25, "scores": {}}
        }"#;
        assert!(serde_json::from_str::<ClassificationRecord>(raw).is_err());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(RecordStoreError::Transport("timeout".into()).is_retryable());
        assert!(RecordStoreError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!RecordStoreError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!RecordStoreError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_weights_payload_patch() {
        let payload = WeightsPayload::from_config(&ClassifierConfig::default());
        let patch = payload.to_patch();
        assert_eq!(patch["thresholds"]["document"], 1.5);
        assert_eq!(patch["weights"]["TP"]["clip_factor"], 4.0);
        assert!(patch.get("version").is_none());
    }
}
