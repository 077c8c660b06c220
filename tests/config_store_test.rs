//! Persistence, recovery and layering tests for the configuration store

use adaptive_classifier::config::audit::AuditAction;
use adaptive_classifier::config::layers;
use adaptive_classifier::config::{ConfigError, ConfigStore};
use adaptive_classifier::DocumentClass;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

async fn open(dir: &Path) -> ConfigStore {
    ConfigStore::open_with_environment(dir.join("config.toml"), layers::empty()).await
}

fn read_toml(path: &Path) -> Value {
    toml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_persisted_write_creates_backup_of_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;

    store.update(&json!({"thresholds": {"document": 2.0}}), true).await.unwrap();
    assert!(store.path().exists());
    assert!(!store.backup_path().exists());

    store.update(&json!({"thresholds": {"document": 2.5}}), true).await.unwrap();
    assert_eq!(read_toml(store.path())["thresholds"]["document"], 2.5);
    assert_eq!(read_toml(store.backup_path())["thresholds"]["document"], 2.0);
}

#[tokio::test]
async fn test_failed_write_leaves_primary_intact() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.update(&json!({"thresholds": {"document": 2.0}}), true).await.unwrap();
    let before = std::fs::read_to_string(store.path()).unwrap();

    // A directory squatting on the temp path makes the temp write fail.
    std::fs::create_dir(dir.path().join("config.toml.tmp")).unwrap();

    let err = store
        .update(&json!({"thresholds": {"document": 3.0}}), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Persist { .. }));

    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    assert_eq!(store.snapshot().await.thresholds.get(DocumentClass::Document), 2.0);

    let reopened = open(dir.path()).await;
    assert_eq!(reopened.snapshot().await.thresholds.get(DocumentClass::Document), 2.0);
}

#[tokio::test]
async fn test_corrupt_primary_recovers_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.update(&json!({"thresholds": {"document": 2.0}}), true).await.unwrap();
    store.update(&json!({"thresholds": {"document": 2.5}}), true).await.unwrap();
    drop(store);

    std::fs::write(dir.path().join("config.toml"), "thresholds = [not toml").unwrap();

    let recovered = open(dir.path()).await;
    assert_eq!(recovered.snapshot().await.thresholds.get(DocumentClass::Document), 2.0);
}

#[tokio::test]
async fn test_schema_invalid_primary_recovers_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.update(&json!({"thresholds": {"document": 2.0}}), true).await.unwrap();
    store.update(&json!({"thresholds": {"document": 2.5}}), true).await.unwrap();
    drop(store);

    std::fs::write(dir.path().join("config.toml"), "[weights.TP]\nclip_factor = -4.0\n").unwrap();

    let recovered = open(dir.path()).await;
    assert_eq!(recovered.snapshot().await.thresholds.get(DocumentClass::Document), 2.0);
}

#[tokio::test]
async fn test_missing_primary_with_backup_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.update(&json!({"thresholds": {"document": 2.0}}), true).await.unwrap();
    store.update(&json!({"thresholds": {"document": 2.5}}), true).await.unwrap();
    drop(store);

    // Crash between rotating the old file and renaming the new one into place
    std::fs::remove_file(dir.path().join("config.toml")).unwrap();

    let recovered = open(dir.path()).await;
    assert_eq!(recovered.snapshot().await.thresholds.get(DocumentClass::Document), 2.0);
}

#[tokio::test]
async fn test_both_files_corrupt_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "{{{").unwrap();
    std::fs::write(dir.path().join("config.toml.backup"), "version = 7").unwrap();

    let store = open(dir.path()).await;
    assert_eq!(*store.snapshot().await, adaptive_classifier::ClassifierConfig::default());
    assert!(store.file_layer().await.is_none());
}

#[tokio::test]
async fn test_persisted_write_folds_runtime_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;

    store
        .update(&json!({"thresholds": {"document": 2.5, "photo": 0.8}}), false)
        .await
        .unwrap();
    let written = json!({
        "thresholds": {"document": 2.0, "typeplate": 3.5},
        "weights": {"DOC": {"clip_factor": 2.2}}
    });
    store.update(&written, true).await.unwrap();

    // the explicit update wins, untouched runtime values are kept
    let merged = store.get(None).await.unwrap();
    assert_eq!(merged["thresholds"]["document"], 2.0);
    assert_eq!(merged["thresholds"]["photo"], 0.8);
    assert_eq!(merged["thresholds"]["typeplate"], 3.5);
    assert_eq!(merged["weights"]["DOC"]["clip_factor"], 2.2);
    assert!(!store.metadata().await.has_runtime_overrides);

    // runtime values now live in the file
    let on_disk = read_toml(store.path());
    assert_eq!(on_disk["thresholds"]["document"], 2.0);
    assert_eq!(on_disk["thresholds"]["photo"], 0.8);
    assert_eq!(on_disk["thresholds"]["typeplate"], 3.5);
    assert_eq!(on_disk["weights"]["DOC"]["clip_factor"], 2.2);
    assert_eq!(Some(on_disk), store.file_layer().await);

    let cleared = store.reload(true).await;
    assert_eq!(cleared["thresholds"]["photo"], 0.8);
    assert_eq!(cleared, merged);

    let reopened = open(dir.path()).await;
    assert_eq!(reopened.get(None).await.unwrap(), merged);
}

#[tokio::test]
async fn test_reset_to_defaults_clears_everything_and_audits() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.update(&json!({"thresholds": {"document": 2.0}}), true).await.unwrap();
    store.update(&json!({"thresholds": {"photo": 0.5}}), false).await.unwrap();

    let merged = store.reset_to_defaults().await.unwrap();
    assert_eq!(merged, store.defaults());
    assert!(!store.metadata().await.has_runtime_overrides);
    assert_eq!(read_toml(store.path()), store.defaults());

    let actions: Vec<AuditAction> = store
        .audit_log()
        .read_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::UpdatePersisted,
            AuditAction::UpdateRuntime,
            AuditAction::ResetToDefaults
        ]
    );
}

#[tokio::test]
async fn test_audit_record_carries_diff() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.update(&json!({"learning": {"recent_events": 4}}), true).await.unwrap();

    let records = store.audit_log().read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].diff["learning.recent_events"], json!({"old": 10, "new": 4}));
    assert!(dir.path().join("config_audit.jsonl").exists());
}

#[tokio::test]
async fn test_environment_layer_cannot_be_overridden() {
    let dir = tempfile::tempdir().unwrap();
    let env = json!({"record_store": {"base_url": "https://records.internal"}});
    let store = ConfigStore::open_with_environment(dir.path().join("config.toml"), env).await;

    store
        .update(&json!({"record_store": {"base_url": "http://elsewhere"}}), true)
        .await
        .unwrap();
    assert_eq!(store.snapshot().await.record_store.base_url, "https://records.internal");
    // persisted, but shadowed
    assert_eq!(read_toml(store.path())["record_store"]["base_url"], "http://elsewhere");
}

#[tokio::test]
async fn test_concurrent_read_modify_write_loses_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(dir.path()).await);

    let tasks = (0..20).map(|_| {
        let store = store.clone();
        async move {
            store
                .update_runtime_with(|current| {
                    let next = current.learning.recent_events + 1;
                    Ok((json!({"learning": {"recent_events": next}}), ()))
                })
                .await
                .unwrap()
        }
    });
    futures::future::join_all(tasks).await;

    assert_eq!(store.snapshot().await.learning.recent_events, 30);
}

#[tokio::test]
async fn test_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let meta = store.metadata().await;
    assert!(!meta.config_file_exists);
    assert!(meta.last_modified.is_none());
    assert_eq!(meta.version, "1.0.0");

    store.update(&json!({"version": "1.1.0"}), true).await.unwrap();
    let meta = store.metadata().await;
    assert!(meta.config_file_exists);
    assert!(meta.last_modified.is_some());
    assert_eq!(meta.version, "1.1.0");
}
