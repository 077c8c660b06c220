//! Configuration management
//!
//! The classifier's tunable parameters (weights, thresholds, learning rates,
//! record-store settings) live in one layered configuration document.
//! `ConfigStore` owns the layers; the types in this module are the typed
//! view of a fully merged snapshot.

pub mod audit;
pub mod layers;
pub mod merge;
pub mod schema;
pub mod store;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::DocumentClass;

pub use layers::{LayerKind, LayerStack};
pub use schema::{ParamRange, ValidationError};
pub use store::{ConfigError, ConfigMetadata, ConfigStore, CorruptState};

/// Fully merged configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub thresholds: ThresholdSet,
    #[serde(default)]
    pub weights: WeightSet,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub record_store: RecordStoreConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            thresholds: ThresholdSet::default(),
            weights: WeightSet::default(),
            learning: LearningConfig::default(),
            record_store: RecordStoreConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// Hardcoded defaults as a JSON document (the lowest layer)
    pub fn defaults_value() -> serde_json::Value {
        // Plain maps and numbers only; serialization cannot fail.
        serde_json::to_value(Self::default()).unwrap_or_default()
    }
}

/// Per-class weight groups, keyed by score key then parameter name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightSet(BTreeMap<String, BTreeMap<String, f64>>);

impl WeightSet {
    pub fn group(&self, class: DocumentClass) -> Option<&BTreeMap<String, f64>> {
        self.0.get(class.score_key())
    }

    pub fn group_mut(&mut self, class: DocumentClass) -> Option<&mut BTreeMap<String, f64>> {
        self.0.get_mut(class.score_key())
    }

    /// Single weight leaf; missing leaves read as 0.0
    pub fn get(&self, class: DocumentClass, param: &str) -> f64 {
        self.group(class)
            .and_then(|g| g.get(param))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set(&mut self, class: DocumentClass, param: &str, value: f64) {
        self.0
            .entry(class.score_key().to_string())
            .or_default()
            .insert(param.to_string(), value);
    }

    /// Raw view keyed by score key
    pub fn groups(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.0
    }
}

impl Default for WeightSet {
    fn default() -> Self {
        let mut weights = WeightSet(BTreeMap::new());
        for class in DocumentClass::ALL {
            for param in schema::weight_params(class) {
                weights.set(class, param.name, param.default);
            }
        }
        weights
    }
}

/// Decision boundaries, keyed by class name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdSet(BTreeMap<String, f64>);

impl ThresholdSet {
    pub fn get(&self, class: DocumentClass) -> f64 {
        self.0.get(class.name()).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, class: DocumentClass, value: f64) {
        self.0.insert(class.name().to_string(), value);
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        let mut thresholds = ThresholdSet(BTreeMap::new());
        thresholds.set(DocumentClass::WorkReport, 5.0);
        thresholds.set(DocumentClass::Typeplate, 3.0);
        thresholds.set(DocumentClass::Document, 1.5);
        // Fallback class
        thresholds.set(DocumentClass::Photo, 0.0);
        thresholds
    }
}

/// Online-update parameters for the learning engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LearningConfig {
    /// Accepted and persisted for existing config files; the update rule
    /// uses the reinforce, penalize and reward factors
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Applied to the predicted class on a correct prediction
    #[serde(default = "default_reinforce_factor")]
    pub reinforce_factor: f64,
    /// Applied to the wrongly predicted class (negative)
    #[serde(default = "default_penalize_factor")]
    pub penalize_factor: f64,
    /// Applied to the corrected class on a wrong prediction
    #[serde(default = "default_reward_factor")]
    pub reward_factor: f64,
    #[serde(default = "default_threshold_recalc_interval")]
    pub threshold_recalc_interval: u32,
    #[serde(default = "default_min_feedback_for_update")]
    pub min_feedback_for_update: u32,
    /// Push weights to the record store every N feedback events
    #[serde(default = "default_weight_sync_interval")]
    pub weight_sync_interval: u32,
    /// Floor for penalized weight leaves
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_min_samples_per_class")]
    pub min_samples_per_class: u32,
    #[serde(default = "default_recalibration_percentile")]
    pub recalibration_percentile: f64,
    #[serde(default = "default_threshold_hysteresis")]
    pub threshold_hysteresis: f64,
    /// Number of recent events reported in statistics
    #[serde(default = "default_recent_events")]
    pub recent_events: u32,
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_reinforce_factor() -> f64 {
    0.05
}

fn default_penalize_factor() -> f64 {
    -0.1
}

fn default_reward_factor() -> f64 {
    0.1
}

fn default_threshold_recalc_interval() -> u32 {
    50
}

fn default_min_feedback_for_update() -> u32 {
    10
}

fn default_weight_sync_interval() -> u32 {
    50
}

fn default_min_weight() -> f64 {
    0.1
}

fn default_min_samples_per_class() -> u32 {
    5
}

fn default_recalibration_percentile() -> f64 {
    25.0
}

fn default_threshold_hysteresis() -> f64 {
    0.1
}

fn default_recent_events() -> u32 {
    10
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            reinforce_factor: default_reinforce_factor(),
            penalize_factor: default_penalize_factor(),
            reward_factor: default_reward_factor(),
            threshold_recalc_interval: default_threshold_recalc_interval(),
            min_feedback_for_update: default_min_feedback_for_update(),
            weight_sync_interval: default_weight_sync_interval(),
            min_weight: default_min_weight(),
            min_samples_per_class: default_min_samples_per_class(),
            recalibration_percentile: default_recalibration_percentile(),
            threshold_hysteresis: default_threshold_hysteresis(),
            recent_events: default_recent_events(),
        }
    }
}

/// External record store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer key; usually supplied through the environment layer
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost/api/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Drift limits above which configuration updates produce warnings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    #[serde(default = "default_weight_drift_warn_pct")]
    pub weight_drift_warn_pct: f64,
    #[serde(default = "default_threshold_drift_warn_pct")]
    pub threshold_drift_warn_pct: f64,
}

fn default_weight_drift_warn_pct() -> f64 {
    50.0
}

fn default_threshold_drift_warn_pct() -> f64 {
    100.0
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            weight_drift_warn_pct: default_weight_drift_warn_pct(),
            threshold_drift_warn_pct: default_threshold_drift_warn_pct(),
        }
    }
}

/// Get the default configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "adaptive-classifier", "adaptive-classifier")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}
