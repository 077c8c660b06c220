//! Append-only feedback history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ClassScores, DocumentClass, UserConfidence};

/// One processed correction, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub classification_id: String,
    pub predicted_class: DocumentClass,
    pub corrected_class: DocumentClass,
    /// Per-class scores at prediction time
    pub scores: ClassScores,
    /// Confidence reported with the original prediction
    pub confidence: f64,
    pub user_confidence: UserConfidence,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(
        classification_id: impl Into<String>,
        predicted_class: DocumentClass,
        corrected_class: DocumentClass,
        scores: ClassScores,
    ) -> Self {
        Self {
            classification_id: classification_id.into(),
            predicted_class,
            corrected_class,
            scores,
            confidence: 0.0,
            user_confidence: UserConfidence::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_user_confidence(mut self, user_confidence: UserConfidence) -> Self {
        self.user_confidence = user_confidence;
        self
    }

    pub fn is_correct(&self) -> bool {
        self.predicted_class == self.corrected_class
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackHistory {
    events: Vec<FeedbackEvent>,
}

impl FeedbackHistory {
    pub fn push(&mut self, event: FeedbackEvent) {
        self.events.push(event);
    }

    /// Drop the newest event; used to undo an append whose update was rejected
    pub(crate) fn pop(&mut self) -> Option<FeedbackEvent> {
        self.events.pop()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[FeedbackEvent] {
        &self.events
    }

    pub fn correct_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_correct()).count()
    }

    /// Scores of `class` on every event where `class` was the ground truth
    pub fn ground_truth_scores(&self, class: DocumentClass) -> Vec<f64> {
        self.events
            .iter()
            .filter(|e| e.corrected_class == class)
            .map(|e| e.scores.get(class))
            .collect()
    }

    /// Newest `k` events, oldest first
    pub fn recent(&self, k: usize) -> &[FeedbackEvent] {
        let start = self.events.len().saturating_sub(k);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
