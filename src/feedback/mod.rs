//! Feedback Coordinator - one correction, end to end
//!
//! 1. resolve the original classification (mandatory)
//! 2. store the raw correction (best effort)
//! 3. run the learning step
//! 4. push weights when a sync boundary was crossed (best effort)
//! 5. report counters

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::learning::{AdaptiveLearningEngine, FeedbackEvent};
use crate::records::{FeedbackRecord, RecordStore, RecordStoreError, UserCorrection, WeightsPayload};
use crate::types::{DocumentClass, UserConfidence};

/// A user's correction of one classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub classification_id: String,
    pub corrected_class: DocumentClass,
    #[serde(default)]
    pub user_confidence: UserConfidence,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// Every step succeeded
    Success,
    /// Learning applied, but storing the correction or the weight sync failed
    Degraded,
}

impl std::fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackStatus::Success => write!(f, "success"),
            FeedbackStatus::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub status: FeedbackStatus,
    /// Weights were pushed to the record store on this event
    pub weights_updated: bool,
    pub feedback_stored: bool,
    pub feedback_count: u64,
    pub current_accuracy: f64,
    pub weights_version: u64,
    pub thresholds_recalibrated: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("classification {0} not found")]
    NotFound(String),

    #[error("could not resolve classification {id}: {source}")]
    Unresolved {
        id: String,
        #[source]
        source: RecordStoreError,
    },

    #[error("learning update rejected: {0}")]
    Learning(#[from] ConfigError),
}

pub struct FeedbackCoordinator {
    records: Arc<dyn RecordStore>,
    learning: Arc<AdaptiveLearningEngine>,
}

impl FeedbackCoordinator {
    pub fn new(records: Arc<dyn RecordStore>, learning: Arc<AdaptiveLearningEngine>) -> Self {
        Self { records, learning }
    }

    pub async fn process_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackOutcome, FeedbackError> {
        let id = request.classification_id.as_str();

        let original = match self.records.get_classification(id).await {
            Ok(record) => record,
            Err(RecordStoreError::NotFound(_)) => return Err(FeedbackError::NotFound(id.to_string())),
            Err(source) => {
                return Err(FeedbackError::Unresolved {
                    id: id.to_string(),
                    source,
                })
            }
        };

        let record = FeedbackRecord {
            classification_id: id.to_string(),
            timestamp: chrono::Utc::now(),
            user_correction: UserCorrection {
                corrected_class: request.corrected_class,
                user_confidence: request.user_confidence,
                correction_reason: request.reason.clone(),
            },
        };
        let feedback_stored = match self.records.store_feedback(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to store feedback for {}: {}", id, e);
                false
            }
        };

        let event = FeedbackEvent::new(
            id,
            original.prediction.class,
            request.corrected_class,
            original.prediction.scores,
        )
        .with_confidence(original.prediction.confidence)
        .with_user_confidence(request.user_confidence);
        let update = self.learning.process_event(event).await?;

        let mut weights_updated = false;
        if update.sync_due {
            info!("Pushing weights to record store (feedback count: {})", update.feedback_count);
            let version = self.learning.config().snapshot().await.version.clone();
            let payload = WeightsPayload {
                weights: update.weights.clone(),
                thresholds: update.thresholds.clone(),
                version,
            };
            match self.records.update_weights(&payload).await {
                Ok(()) => weights_updated = true,
                Err(e) => warn!("Weight sync failed, continuing unsynced: {}", e),
            }
        }

        let status = if feedback_stored && (!update.sync_due || weights_updated) {
            FeedbackStatus::Success
        } else {
            FeedbackStatus::Degraded
        };

        Ok(FeedbackOutcome {
            status,
            weights_updated,
            feedback_stored,
            feedback_count: update.feedback_count,
            current_accuracy: update.accuracy,
            weights_version: update.weights_version,
            thresholds_recalibrated: update.recalibrated,
        })
    }
}
