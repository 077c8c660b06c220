//! Adaptive learning from user corrections
//!
//! Keeps the feedback history, nudges class weight groups on every event,
//! and periodically recalibrates decision thresholds from the scores that
//! ground-truth examples actually received.

pub mod engine;
pub mod history;
pub mod stats;

pub use engine::{AdaptiveLearningEngine, LearningUpdate, ThresholdChange};
pub use history::{FeedbackEvent, FeedbackHistory};
pub use stats::{ConfusionCell, LearningStatistics};
