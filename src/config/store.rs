//! Layered, lock-guarded configuration store with atomic persistence
//!
//! Every operation takes the same exclusive section, so no caller ever sees
//! a half-applied layer. Writes to the persisted layer go through a temp
//! file and a backup rotation; a corrupt primary file falls back to the
//! backup and then to hardcoded defaults, so opening the store never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::audit::{AuditAction, AuditLog};
use super::layers::{self, LayerStack};
use super::merge::{deep_merge, diff, merge_all};
use super::schema::{self, ValidationError};
use super::ClassifierConfig;

/// Errors surfaced by configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown configuration section '{0}'")]
    UnknownSection(String),

    #[error("failed to persist configuration to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode configuration: {0}")]
    Encode(String),
}

/// Why a persisted layer could not be used
#[derive(Debug, thiserror::Error)]
pub enum CorruptState {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid TOML: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{path} violates the configuration schema: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

/// Summary of the store's current state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub version: String,
    pub config_path: PathBuf,
    pub config_file_exists: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub has_runtime_overrides: bool,
    pub record_store_enabled: bool,
}

struct StoreState {
    layers: LayerStack,
    snapshot: Arc<ClassifierConfig>,
}

pub struct ConfigStore {
    path: PathBuf,
    backup_path: PathBuf,
    temp_path: PathBuf,
    audit: AuditLog,
    inner: Mutex<StoreState>,
}

impl ConfigStore {
    /// Open the store at `path`, reading the environment layer from the process environment
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with_environment(path, layers::environment_layer()).await
    }

    /// Open the store with an explicit environment layer
    pub async fn open_with_environment(path: impl Into<PathBuf>, environment: Value) -> Self {
        let path = path.into();
        let backup_path = sibling(&path, ".backup");
        let temp_path = sibling(&path, ".tmp");
        let audit = AuditLog::new(path.with_file_name("config_audit.jsonl"));

        let mut stack = LayerStack::new(layers::validated_environment(environment));
        stack.file = load_file_layer(&path, &backup_path, &stack.defaults).await;
        let snapshot = build_snapshot(&stack);

        info!(
            "Configuration store opened at {} (file layer: {})",
            path.display(),
            if stack.file.is_some() { "loaded" } else { "absent" }
        );

        Self {
            path,
            backup_path,
            temp_path,
            audit,
            inner: Mutex::new(StoreState { layers: stack, snapshot }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Merged configuration, or one top-level section of it
    pub async fn get(&self, section: Option<&str>) -> Result<Value, ConfigError> {
        let state = self.inner.lock().await;
        let merged = state.layers.merged();
        match section {
            None => Ok(merged),
            Some(name) => merged
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownSection(name.to_string())),
        }
    }

    /// Typed snapshot for read-only consumers such as the scoring path
    pub async fn snapshot(&self) -> Arc<ClassifierConfig> {
        self.inner.lock().await.snapshot.clone()
    }

    /// Raw persisted layer, if one is loaded
    pub async fn file_layer(&self) -> Option<Value> {
        self.inner.lock().await.layers.file.clone()
    }

    /// Hardcoded defaults
    pub fn defaults(&self) -> Value {
        ClassifierConfig::defaults_value()
    }

    /// Merged configuration `update(updates, persist)` would produce, validated but not applied
    pub async fn check(&self, updates: &Value, persist: bool) -> Result<Value, ConfigError> {
        ensure_object(updates)?;
        let state = self.inner.lock().await;
        let plan = plan_update(&state.layers, updates, persist);
        plan.validate()?;
        Ok(plan.merged)
    }

    /// Apply `updates` atomically.
    ///
    /// With `persist` the whole non-environment stack plus `updates` is
    /// written (temp file, backup rotation, rename) and becomes the file
    /// layer, so learned runtime values are made durable and the runtime
    /// layer is emptied. Otherwise the updates land in the runtime layer
    /// only. Either way the change is audit-logged, and a validation or
    /// write failure leaves every layer untouched.
    pub async fn update(&self, updates: &Value, persist: bool) -> Result<Value, ConfigError> {
        ensure_object(updates)?;
        let mut state = self.inner.lock().await;
        let before = state.layers.merged();
        let plan = plan_update(&state.layers, updates, persist);
        let config = plan.validate()?;

        if persist {
            if let Some(file) = &plan.file {
                self.atomic_write(file).await?;
            }
            if state.layers.has_runtime_overrides() {
                info!("Runtime overrides folded into {}", self.path.display());
            }
        }

        let PlannedUpdate { file, runtime, merged, .. } = plan;
        state.layers.file = file;
        state.layers.runtime = runtime;
        state.snapshot = Arc::new(config);

        if persist {
            self.audit.record(AuditAction::UpdatePersisted, diff(&before, &merged)).await;
            info!("Configuration updated and persisted to {}", self.path.display());
        } else {
            self.audit.record(AuditAction::UpdateRuntime, diff(&before, &merged)).await;
            debug!("Runtime configuration override applied");
        }
        Ok(merged)
    }

    /// Read-modify-write of the runtime layer inside one critical section.
    ///
    /// `f` sees the current snapshot and returns the patch to merge into the
    /// runtime layer together with a value handed back to the caller.
    pub async fn update_runtime_with<T, F>(&self, f: F) -> Result<T, ConfigError>
    where
        F: FnOnce(&ClassifierConfig) -> Result<(Value, T), ConfigError>,
    {
        let mut state = self.inner.lock().await;
        let current = state.snapshot.clone();
        let (patch, output) = f(&current)?;
        ensure_object(&patch)?;

        let before = state.layers.merged();
        let runtime = deep_merge(&state.layers.runtime, &patch);
        let merged = state.layers.merged_with_runtime(&runtime);
        let config = schema::validate(&merged)?;

        state.layers.runtime = runtime;
        state.snapshot = Arc::new(config);
        self.audit.record(AuditAction::UpdateRuntime, diff(&before, &merged)).await;
        Ok(output)
    }

    /// Re-read the persisted layer; `clear_runtime` discards runtime overrides
    pub async fn reload(&self, clear_runtime: bool) -> Value {
        let mut state = self.inner.lock().await;
        let before = state.layers.merged();

        if clear_runtime && state.layers.has_runtime_overrides() {
            warn!("Runtime overrides cleared - learning progress discarded");
        }
        if clear_runtime {
            state.layers.runtime = layers::empty();
        }
        state.layers.file = load_file_layer(&self.path, &self.backup_path, &state.layers.defaults).await;
        state.snapshot = build_snapshot(&state.layers);

        let merged = state.layers.merged();
        self.audit.record(AuditAction::Reload, diff(&before, &merged)).await;
        info!("Configuration reloaded from {}", self.path.display());
        merged
    }

    /// Drop runtime overrides and persist the hardcoded defaults
    pub async fn reset_to_defaults(&self) -> Result<Value, ConfigError> {
        let mut state = self.inner.lock().await;
        let before = state.layers.merged();
        let defaults = state.layers.defaults.clone();

        self.atomic_write(&defaults).await?;
        state.layers.file = Some(defaults);
        state.layers.runtime = layers::empty();
        state.snapshot = build_snapshot(&state.layers);

        let merged = state.layers.merged();
        self.audit.record(AuditAction::ResetToDefaults, diff(&before, &merged)).await;
        warn!("Configuration reset to defaults");
        Ok(merged)
    }

    pub async fn clear_runtime_overrides(&self) {
        let mut state = self.inner.lock().await;
        let before = state.layers.merged();
        state.layers.runtime = layers::empty();
        state.snapshot = build_snapshot(&state.layers);
        let merged = state.layers.merged();
        self.audit.record(AuditAction::ClearRuntime, diff(&before, &merged)).await;
        info!("Runtime overrides cleared");
    }

    /// Advisory warnings for a proposed update; never blocks it
    pub async fn validate_safety(&self, updates: &Value, persist: bool) -> Vec<String> {
        let state = self.inner.lock().await;
        let current = state.layers.merged();
        let proposed = plan_update(&state.layers, updates, persist).merged;
        let limits = state.snapshot.safety.clone();
        drop(state);

        let mut warnings = Vec::new();

        let weight_drift = mean_leaf_drift_pct(&current["weights"], &proposed["weights"]);
        if weight_drift > limits.weight_drift_warn_pct {
            warnings.push(format!(
                "Weights changed by {:.1}% on average - may significantly affect classification accuracy",
                weight_drift
            ));
        }

        if let (Some(old), Some(new)) = (current["thresholds"].as_object(), proposed["thresholds"].as_object()) {
            for (class, old_value) in old {
                let old_value = old_value.as_f64().unwrap_or(0.0);
                let new_value = new.get(class).and_then(Value::as_f64).unwrap_or(0.0);
                if old_value > 0.0 {
                    let change = (new_value - old_value).abs() / old_value * 100.0;
                    if change > limits.threshold_drift_warn_pct {
                        warnings.push(format!(
                            "Threshold '{}' changed by {:.1}% - classification behavior will change significantly",
                            class, change
                        ));
                    }
                }
            }
        }

        warnings
    }

    pub async fn metadata(&self) -> ConfigMetadata {
        let state = self.inner.lock().await;
        let last_modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        ConfigMetadata {
            version: state.snapshot.version.clone(),
            config_path: self.path.clone(),
            config_file_exists: self.path.exists(),
            last_modified,
            has_runtime_overrides: state.layers.has_runtime_overrides(),
            record_store_enabled: state.snapshot.record_store.enabled,
        }
    }

    /// Temp write, rotate current file to backup, rename temp into place
    async fn atomic_write(&self, value: &Value) -> Result<(), ConfigError> {
        let body = toml::to_string_pretty(value).map_err(|e| ConfigError::Encode(e.to_string()))?;

        let result = async {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::File::create(&self.temp_path).await?;
            file.write_all(body.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);

            if self.path.exists() {
                tokio::fs::rename(&self.path, &self.backup_path).await?;
            }
            tokio::fs::rename(&self.temp_path, &self.path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(source) = result {
            error!("Failed to save configuration to {}: {}", self.path.display(), source);
            if self.temp_path.is_file() {
                let _ = tokio::fs::remove_file(&self.temp_path).await;
            }
            return Err(ConfigError::Persist {
                path: self.path.clone(),
                source,
            });
        }

        debug!("Configuration written to {}", self.path.display());
        Ok(())
    }
}

/// Layers as they would stand after an update
struct PlannedUpdate {
    file: Option<Value>,
    runtime: Value,
    merged: Value,
    rewrites_file: bool,
}

impl PlannedUpdate {
    /// Both the merged stack and, when rewritten, the file candidate must be valid
    fn validate(&self) -> Result<ClassifierConfig, ConfigError> {
        let config = schema::validate(&self.merged)?;
        if let (true, Some(file)) = (self.rewrites_file, &self.file) {
            schema::validate(file)?;
        }
        Ok(config)
    }
}

fn plan_update(stack: &LayerStack, updates: &Value, persist: bool) -> PlannedUpdate {
    if persist {
        let file = deep_merge(&stack.persistable(), updates);
        let runtime = layers::empty();
        let merged = merge_all([&stack.defaults, &file, &runtime, &stack.environment]);
        PlannedUpdate {
            file: Some(file),
            runtime,
            merged,
            rewrites_file: true,
        }
    } else {
        let runtime = deep_merge(&stack.runtime, updates);
        let merged = stack.merged_with_runtime(&runtime);
        PlannedUpdate {
            file: stack.file.clone(),
            runtime,
            merged,
            rewrites_file: false,
        }
    }
}

fn ensure_object(value: &Value) -> Result<(), ConfigError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::single("updates: must be an object").into())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.toml".to_string());
    path.with_file_name(format!("{}{}", name, suffix))
}

/// Validated merge of the stack; falls back to defaults if the merge is invalid
fn build_snapshot(stack: &LayerStack) -> Arc<ClassifierConfig> {
    match schema::validate(&stack.merged()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Merged configuration is invalid ({}); serving hardcoded defaults", e);
            Arc::new(ClassifierConfig::default())
        }
    }
}

/// Read one persisted layer. `Ok(None)` means the file does not exist.
async fn read_layer(path: &Path, defaults: &Value) -> Result<Option<Value>, CorruptState> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CorruptState::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
    let value: Value = toml::from_str(&content).map_err(|e| CorruptState::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    schema::validate(&deep_merge(defaults, &value)).map_err(|source| CorruptState::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Primary file, else backup, else nothing (defaults)
async fn load_file_layer(path: &Path, backup: &Path, defaults: &Value) -> Option<Value> {
    match read_layer(path, defaults).await {
        Ok(Some(value)) => {
            debug!("Loaded configuration from {}", path.display());
            return Some(value);
        }
        Ok(None) if !backup.exists() => return None,
        Ok(None) => warn!("{} is missing but a backup exists; recovering", path.display()),
        Err(e) => warn!("Configuration file corrupted: {}; attempting recovery from backup", e),
    }

    match read_layer(backup, defaults).await {
        Ok(Some(value)) => {
            info!("Recovered configuration from backup {}", backup.display());
            Some(value)
        }
        Ok(None) => {
            warn!("No usable backup; using hardcoded defaults");
            None
        }
        Err(e) => {
            error!("Backup configuration also unusable: {}", e);
            warn!("Using hardcoded defaults - all custom configuration lost");
            None
        }
    }
}

/// Mean relative change (percent) over numeric leaves present in both trees
fn mean_leaf_drift_pct(old: &Value, new: &Value) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    collect_drift(old, new, &mut total, &mut count);
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn collect_drift(old: &Value, new: &Value, total: &mut f64, count: &mut usize) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_value) in a {
                if let Some(new_value) = b.get(key) {
                    collect_drift(old_value, new_value, total, count);
                }
            }
        }
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            if a != 0.0 {
                *total += (b - a).abs() / a.abs() * 100.0;
                *count += 1;
            }
        }
        _ => {}
    }
}
