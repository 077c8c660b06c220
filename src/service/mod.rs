//! Exposed operations
//!
//! `ClassifierService` wires the configuration store, learning engine,
//! feedback coordinator and record store together and is the only place
//! credentials are checked. Calls to the record store always run after the
//! store lock has been released.

pub mod auth;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::merge::{deep_merge, diff};
use crate::config::schema::{self, ConfigSchema};
use crate::config::{ConfigError, ConfigMetadata, ConfigStore};
use crate::feedback::{FeedbackCoordinator, FeedbackError, FeedbackOutcome, FeedbackRequest};
use crate::learning::{AdaptiveLearningEngine, LearningStatistics};
use crate::records::{
    ClassificationRecord, HttpRecordStore, InMemoryRecordStore, RecordStore, RecordStoreError,
    WeightsPayload,
};
use crate::scoring::{self, Classification, FeatureSnapshot};

pub use auth::ApiCredentials;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration API is disabled (CONFIG_API_KEY not set)")]
    ApiDisabled,

    #[error("invalid or missing API key")]
    Unauthorized,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error(transparent)]
    RecordStore(#[from] RecordStoreError),

    #[error("record store integration is not enabled")]
    RecordStoreDisabled,

    #[error("no {0} available")]
    BaselineMissing(&'static str),
}

/// What a configuration diff compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffBaseline {
    Defaults,
    File,
    RecordStore,
}

impl std::fmt::Display for DiffBaseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffBaseline::Defaults => write!(f, "defaults"),
            DiffBaseline::File => write!(f, "file"),
            DiffBaseline::RecordStore => write!(f, "record-store"),
        }
    }
}

impl std::str::FromStr for DiffBaseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "defaults" => Ok(DiffBaseline::Defaults),
            "file" => Ok(DiffBaseline::File),
            "record-store" => Ok(DiffBaseline::RecordStore),
            other => Err(format!(
                "invalid baseline '{}' (expected defaults, file or record-store)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub classification_id: String,
    #[serde(flatten)]
    pub classification: Classification,
    pub weights_version: u64,
    /// The record reached the record store
    pub stored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Validated,
    Updated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdateResponse {
    pub status: UpdateStatus,
    pub warnings: Vec<String>,
    pub config: Value,
    /// Weights or thresholds changed underneath the learning history
    pub learning_reset_required: bool,
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResetResponse {
    pub config: Value,
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDiff {
    pub baseline: DiffBaseline,
    pub has_differences: bool,
    pub diff: BTreeMap<String, Value>,
}

pub struct ClassifierService {
    config: Arc<ConfigStore>,
    learning: Arc<AdaptiveLearningEngine>,
    feedback: FeedbackCoordinator,
    records: Arc<dyn RecordStore>,
    credentials: ApiCredentials,
}

impl ClassifierService {
    pub fn new(config: Arc<ConfigStore>, records: Arc<dyn RecordStore>, credentials: ApiCredentials) -> Self {
        let learning = Arc::new(AdaptiveLearningEngine::new(config.clone()));
        let feedback = FeedbackCoordinator::new(records.clone(), learning.clone());
        Self {
            config,
            learning,
            feedback,
            records,
            credentials,
        }
    }

    /// Pick the HTTP record store when enabled, the in-memory one otherwise
    pub async fn from_store(config: Arc<ConfigStore>, credentials: ApiCredentials) -> Result<Self, ServiceError> {
        let settings = config.snapshot().await.record_store.clone();
        let records: Arc<dyn RecordStore> = if settings.enabled {
            info!("Record store enabled at {}", settings.base_url);
            Arc::new(HttpRecordStore::new(&settings)?)
        } else {
            info!("Record store disabled, keeping records in memory");
            Arc::new(InMemoryRecordStore::new())
        };
        Ok(Self::new(config, records, credentials))
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn learning(&self) -> &Arc<AdaptiveLearningEngine> {
        &self.learning
    }

    /// Pull shared weights into the runtime layer; false if nothing was applied
    pub async fn bootstrap(&self) -> bool {
        match self.records.get_weights().await {
            Ok(Some(payload)) => match self.config.update(&payload.to_patch(), false).await {
                Ok(_) => {
                    info!("Loaded weights from record store (version {})", payload.version);
                    true
                }
                Err(e) => {
                    warn!("Ignoring record store weights: {}", e);
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                warn!("Could not fetch weights from record store: {}", e);
                false
            }
        }
    }

    pub async fn classify(&self, features: FeatureSnapshot) -> ClassificationResponse {
        let snapshot = self.config.snapshot().await;
        let classification = scoring::classify(&features, &snapshot.weights, &snapshot.thresholds);
        let classification_id = uuid::Uuid::new_v4().to_string();
        let weights_version = self.learning.weights_version().await;

        let record = ClassificationRecord::new(
            classification_id.clone(),
            &classification,
            features,
            snapshot.version.clone(),
            weights_version,
        );
        let stored = match self.records.store_classification(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to store classification {}: {}", classification_id, e);
                false
            }
        };

        ClassificationResponse {
            classification_id,
            classification,
            weights_version,
            stored,
        }
    }

    pub async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackOutcome, ServiceError> {
        Ok(self.feedback.process_feedback(request).await?)
    }

    pub async fn learning_statistics(&self) -> LearningStatistics {
        self.learning.statistics().await
    }

    pub async fn reset_learning(&self, credential: Option<&str>) -> Result<(), ServiceError> {
        self.credentials.verify(credential)?;
        self.learning.reset_learning().await;
        Ok(())
    }

    pub async fn get_config(&self, credential: Option<&str>, section: Option<&str>) -> Result<Value, ServiceError> {
        self.credentials.verify(credential)?;
        Ok(self.config.get(section).await?)
    }

    /// Declared parameters with defaults and ranges; open to everyone
    pub fn schema(&self) -> ConfigSchema {
        schema::describe()
    }

    pub async fn config_metadata(&self, credential: Option<&str>) -> Result<ConfigMetadata, ServiceError> {
        self.credentials.verify(credential)?;
        Ok(self.config.metadata().await)
    }

    /// Validate and, unless `dry_run`, persist `updates`
    pub async fn update_config(
        &self,
        credential: Option<&str>,
        updates: &Value,
        dry_run: bool,
    ) -> Result<ConfigUpdateResponse, ServiceError> {
        self.credentials.verify(credential)?;
        let warnings = self.config.validate_safety(updates, true).await;
        let learning_reset_required = updates.get("weights").is_some() || updates.get("thresholds").is_some();

        if dry_run {
            let config = self.config.check(updates, true).await?;
            return Ok(ConfigUpdateResponse {
                status: UpdateStatus::Validated,
                warnings,
                config,
                learning_reset_required,
                synced: false,
            });
        }

        let config = self.config.update(updates, true).await?;
        if learning_reset_required {
            warn!("Weights or thresholds changed; learning history no longer matches the parameters");
        }

        let synced = if learning_reset_required {
            self.push_current_weights().await
        } else {
            false
        };

        Ok(ConfigUpdateResponse {
            status: UpdateStatus::Updated,
            warnings,
            config,
            learning_reset_required,
            synced,
        })
    }

    pub async fn reload_config(&self, credential: Option<&str>, clear_runtime: bool) -> Result<Value, ServiceError> {
        self.credentials.verify(credential)?;
        Ok(self.config.reload(clear_runtime).await)
    }

    /// Reset to defaults and push them to the record store
    pub async fn reset_config(&self, credential: Option<&str>) -> Result<ConfigResetResponse, ServiceError> {
        self.credentials.verify(credential)?;
        let config = self.config.reset_to_defaults().await?;
        let synced = self.push_current_weights().await;
        Ok(ConfigResetResponse { config, synced })
    }

    pub async fn diff_config(&self, credential: Option<&str>, baseline: DiffBaseline) -> Result<ConfigDiff, ServiceError> {
        self.credentials.verify(credential)?;
        let current = self.config.get(None).await?;

        let reference = match baseline {
            DiffBaseline::Defaults => self.config.defaults(),
            DiffBaseline::File => {
                let file = self
                    .config
                    .file_layer()
                    .await
                    .ok_or(ServiceError::BaselineMissing("config file"))?;
                deep_merge(&self.config.defaults(), &file)
            }
            DiffBaseline::RecordStore => {
                let payload = self.fetch_shared_weights().await?;
                deep_merge(&current, &payload.to_patch())
            }
        };

        let changes = diff(&reference, &current);
        Ok(ConfigDiff {
            baseline,
            has_differences: !changes.is_empty(),
            diff: changes,
        })
    }

    /// Apply the record store's weights, to the file layer when `persist`
    pub async fn sync_from_record_store(&self, credential: Option<&str>, persist: bool) -> Result<Value, ServiceError> {
        self.credentials.verify(credential)?;
        let payload = self.fetch_shared_weights().await?;
        let config = self.config.update(&payload.to_patch(), persist).await?;
        info!("Synced weights from record store (persisted: {})", persist);
        Ok(config)
    }

    async fn fetch_shared_weights(&self) -> Result<WeightsPayload, ServiceError> {
        if !self.config.snapshot().await.record_store.enabled {
            return Err(ServiceError::RecordStoreDisabled);
        }
        self.records
            .get_weights()
            .await?
            .ok_or(ServiceError::BaselineMissing("weights in record store"))
    }

    async fn push_current_weights(&self) -> bool {
        let snapshot = self.config.snapshot().await;
        if !snapshot.record_store.enabled {
            return false;
        }
        match self.records.update_weights(&WeightsPayload::from_config(&snapshot)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to push weights to record store: {}", e);
                false
            }
        }
    }
}
