//! Append-only audit log of configuration changes (JSON lines)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::error;

/// Kind of configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UpdatePersisted,
    UpdateRuntime,
    Reload,
    ResetToDefaults,
    ClearRuntime,
}

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub diff: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record; failures are logged and never propagated
    pub async fn record(&self, action: AuditAction, diff: BTreeMap<String, Value>) {
        let record = AuditRecord {
            timestamp: Utc::now(),
            action,
            diff,
        };
        if let Err(e) = self.append(&record).await {
            error!("Failed to write audit log {}: {:#}", self.path.display(), e);
        }
    }

    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to encode audit record")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("Failed to open audit log")?;
        file.write_all(line.as_bytes()).await.context("Failed to append audit record")?;
        file.flush().await?;
        Ok(())
    }

    /// Read every record back, skipping lines that fail to parse
    pub async fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}
