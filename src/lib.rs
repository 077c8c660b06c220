//! Adaptive Classifier - scoring and self-tuning configuration library
//!
//! Turns per-image feature signals into a document-class decision and
//! evolves the weights and thresholds behind that decision from user
//! corrections, with:
//! - Layered configuration (defaults, file, runtime, environment)
//! - Atomic, audited persistence with backup recovery
//! - Priority-ordered scoring against a shared snapshot
//! - Multiplicative online learning and threshold recalibration
//! - Best-effort sync with an external record store
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adaptive_classifier::{ApiCredentials, ClassifierService, ConfigStore, FeatureSnapshot};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(ConfigStore::open("config.toml").await);
//!     let service = ClassifierService::from_store(store, ApiCredentials::from_env()).await?;
//!     let features = FeatureSnapshot::new().with("text_length", 640.0);
//!     println!("{:?}", service.classify(features).await);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod config;
pub mod scoring;
pub mod learning;
pub mod records;
pub mod feedback;
pub mod service;
pub mod cli;

pub use types::{ClassScores, DocumentClass, UserConfidence};

pub use config::{ClassifierConfig, ConfigError, ConfigStore, ValidationError};

pub use scoring::{classify, Classification, FeatureSnapshot};

pub use learning::{AdaptiveLearningEngine, LearningStatistics, LearningUpdate};

pub use records::{HttpRecordStore, InMemoryRecordStore, RecordStore, RecordStoreError};

pub use feedback::{FeedbackCoordinator, FeedbackError, FeedbackOutcome, FeedbackRequest};

pub use service::{ApiCredentials, ClassifierService, ServiceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - adaptive document classifier", NAME, VERSION)
}
