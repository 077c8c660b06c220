//! Learning statistics and the percentile helper used by recalibration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::history::{FeedbackEvent, FeedbackHistory};
use crate::config::ThresholdSet;
use crate::types::DocumentClass;

/// Count of events for one (predicted, corrected) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCell {
    pub predicted: DocumentClass,
    pub corrected: DocumentClass,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub predicted: BTreeMap<DocumentClass, usize>,
    pub corrected: BTreeMap<DocumentClass, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningStatistics {
    pub total_feedback: usize,
    pub correct_predictions: usize,
    /// correct / total over the whole history; 0 when empty
    pub accuracy: f64,
    pub class_distribution: ClassDistribution,
    pub confusion: Vec<ConfusionCell>,
    pub weights_version: u64,
    pub current_thresholds: ThresholdSet,
    pub recent_feedback: Vec<FeedbackEvent>,
}

impl LearningStatistics {
    pub fn from_history(
        history: &FeedbackHistory,
        weights_version: u64,
        current_thresholds: ThresholdSet,
        recent: usize,
    ) -> Self {
        let mut distribution = ClassDistribution::default();
        let mut confusion: BTreeMap<(DocumentClass, DocumentClass), usize> = BTreeMap::new();

        for event in history.events() {
            *distribution.predicted.entry(event.predicted_class).or_default() += 1;
            *distribution.corrected.entry(event.corrected_class).or_default() += 1;
            *confusion
                .entry((event.predicted_class, event.corrected_class))
                .or_default() += 1;
        }

        Self {
            total_feedback: history.len(),
            correct_predictions: history.correct_count(),
            accuracy: accuracy(history),
            class_distribution: distribution,
            confusion: confusion
                .into_iter()
                .map(|((predicted, corrected), count)| ConfusionCell {
                    predicted,
                    corrected,
                    count,
                })
                .collect(),
            weights_version,
            current_thresholds,
            recent_feedback: history.recent(recent).to_vec(),
        }
    }
}

pub fn accuracy(history: &FeedbackHistory) -> f64 {
    if history.is_empty() {
        0.0
    } else {
        history.correct_count() as f64 / history.len() as f64
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `pct` is in [0, 100]. Returns `None` for an empty sample.
pub fn percentile(samples: &[f64], pct: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassScores;

    #[test]
    fn test_percentile_interpolates() {
        let samples = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&samples, 25.0), Some(2.0));
        assert_eq!(percentile(&samples, 50.0), Some(3.0));
        assert_eq!(percentile(&[1.0, 2.0], 25.0), Some(1.25));
        assert_eq!(percentile(&[7.0], 25.0), Some(7.0));
        assert_eq!(percentile(&[], 25.0), None);
    }

    #[test]
    fn test_statistics_tallies() {
        let mut history = FeedbackHistory::default();
        let scores = ClassScores::default();
        history.push(FeedbackEvent::new("a", DocumentClass::Document, DocumentClass::Photo, scores));
        history.push(FeedbackEvent::new("b", DocumentClass::Document, DocumentClass::Photo, scores));
        history.push(FeedbackEvent::new("c", DocumentClass::Photo, DocumentClass::Photo, scores));

        let stats = LearningStatistics::from_history(&history, 1, ThresholdSet::default(), 2);
        assert_eq!(stats.total_feedback, 3);
        assert_eq!(stats.correct_predictions, 1);
        assert!((stats.accuracy - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.class_distribution.predicted[&DocumentClass::Document], 2);
        assert_eq!(stats.class_distribution.corrected[&DocumentClass::Photo], 3);
        assert_eq!(
            stats.confusion,
            vec![
                ConfusionCell { predicted: DocumentClass::Document, corrected: DocumentClass::Photo, count: 2 },
                ConfusionCell { predicted: DocumentClass::Photo, corrected: DocumentClass::Photo, count: 1 },
            ]
        );
        assert_eq!(stats.recent_feedback.len(), 2);
        assert_eq!(stats.recent_feedback[1].classification_id, "c");
    }

    #[test]
    fn test_empty_history_has_zero_accuracy() {
        let stats = LearningStatistics::from_history(&FeedbackHistory::default(), 1, ThresholdSet::default(), 10);
        assert_eq!(stats.accuracy, 0.0);
        assert!(stats.confusion.is_empty());
    }
}
