//! Adaptive Learning Engine
//!
//! Applies the multiplicative reinforce / penalize / reward rule to whole
//! class weight groups and recalibrates thresholds at a fixed feedback
//! interval. Adjusted parameters go to the store's runtime layer only; the
//! persisted file is never written from here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::history::{FeedbackEvent, FeedbackHistory};
use super::stats::{accuracy, percentile, LearningStatistics};
use crate::config::schema::{weight_range, THRESHOLD_RANGE};
use crate::config::{ConfigError, ConfigStore, LearningConfig, ThresholdSet, WeightSet};
use crate::types::{ClassScores, DocumentClass};

/// One applied threshold move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChange {
    pub class: DocumentClass,
    pub old: f64,
    pub new: f64,
}

/// Outcome of processing one feedback event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningUpdate {
    pub feedback_count: u64,
    pub weights_version: u64,
    pub weights: WeightSet,
    pub thresholds: ThresholdSet,
    /// A recalibration boundary was reached on this event
    pub recalibrated: bool,
    pub threshold_changes: Vec<ThresholdChange>,
    /// `feedback_count` is a multiple of the weight sync interval
    pub sync_due: bool,
    pub accuracy: f64,
}

struct LearningState {
    feedback_count: u64,
    weights_version: u64,
    history: FeedbackHistory,
}

/// What the store closure hands back
struct Applied {
    weights: WeightSet,
    thresholds: ThresholdSet,
    recalibrated: bool,
    threshold_changes: Vec<ThresholdChange>,
    sync_due: bool,
}

pub struct AdaptiveLearningEngine {
    config: Arc<ConfigStore>,
    state: Mutex<LearningState>,
}

impl AdaptiveLearningEngine {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            state: Mutex::new(LearningState {
                feedback_count: 0,
                weights_version: 1,
                history: FeedbackHistory::default(),
            }),
        }
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Shorthand for `process_event` with an anonymous event
    pub async fn process(
        &self,
        prior_scores: ClassScores,
        predicted: DocumentClass,
        corrected: DocumentClass,
    ) -> Result<LearningUpdate, ConfigError> {
        self.process_event(FeedbackEvent::new("", predicted, corrected, prior_scores))
            .await
    }

    /// Record one event and apply the update rule.
    ///
    /// The learning lock is held across the store update, so concurrent
    /// feedback is applied strictly one event at a time. If the store
    /// rejects the update the event is rolled back out of the history.
    pub async fn process_event(&self, event: FeedbackEvent) -> Result<LearningUpdate, ConfigError> {
        let mut state = self.state.lock().await;
        let predicted = event.predicted_class;
        let corrected = event.corrected_class;
        let count = state.feedback_count + 1;

        info!(
            "Feedback #{}: predicted={}, corrected={}",
            count, predicted, corrected
        );
        state.history.push(event);

        let history = &state.history;
        let result = self
            .config
            .update_runtime_with(|current| {
                let learning = &current.learning;
                let mut weights = current.weights.clone();
                let mut thresholds = current.thresholds.clone();
                let mut patch = Map::new();

                let touched = apply_weight_rule(&mut weights, predicted, corrected, learning);
                let mut groups = Map::new();
                for class in touched {
                    if let Some(group) = weights.group(class) {
                        groups.insert(class.score_key().to_string(), json!(group));
                    }
                }
                patch.insert("weights".into(), Value::Object(groups));

                let recalibrated = count % u64::from(learning.threshold_recalc_interval.max(1)) == 0;
                let threshold_changes = if recalibrated {
                    recalibrate_thresholds(history, &mut thresholds, learning)
                } else {
                    Vec::new()
                };
                if !threshold_changes.is_empty() {
                    let changed: Map<String, Value> = threshold_changes
                        .iter()
                        .map(|c| (c.class.name().to_string(), json!(c.new)))
                        .collect();
                    patch.insert("thresholds".into(), Value::Object(changed));
                }

                let sync_due = count % u64::from(learning.weight_sync_interval.max(1)) == 0;
                Ok((
                    Value::Object(patch),
                    Applied {
                        weights,
                        thresholds,
                        recalibrated,
                        threshold_changes,
                        sync_due,
                    },
                ))
            })
            .await;

        let applied = match result {
            Ok(applied) => applied,
            Err(e) => {
                warn!("Learning update rejected, event discarded: {}", e);
                state.history.pop();
                return Err(e);
            }
        };

        state.feedback_count = count;
        if applied.recalibrated {
            // Bumped on every pass, including passes that move no threshold.
            state.weights_version += 1;
            info!(
                "Threshold recalibration pass complete ({} changed), weights version {}",
                applied.threshold_changes.len(),
                state.weights_version
            );
        }

        Ok(LearningUpdate {
            feedback_count: state.feedback_count,
            weights_version: state.weights_version,
            weights: applied.weights,
            thresholds: applied.thresholds,
            recalibrated: applied.recalibrated,
            threshold_changes: applied.threshold_changes,
            sync_due: applied.sync_due,
            accuracy: accuracy(&state.history),
        })
    }

    pub async fn statistics(&self) -> LearningStatistics {
        let state = self.state.lock().await;
        let snapshot = self.config.snapshot().await;
        LearningStatistics::from_history(
            &state.history,
            state.weights_version,
            snapshot.thresholds.clone(),
            snapshot.learning.recent_events as usize,
        )
    }

    pub async fn feedback_count(&self) -> u64 {
        self.state.lock().await.feedback_count
    }

    pub async fn weights_version(&self) -> u64 {
        self.state.lock().await.weights_version
    }

    /// Clear history and counters; weights, thresholds and version are kept
    pub async fn reset_learning(&self) {
        let mut state = self.state.lock().await;
        warn!(
            "Resetting learning history ({} events discarded)",
            state.history.len()
        );
        state.history.clear();
        state.feedback_count = 0;
    }
}

/// Multiply whole class groups; returns the groups that were touched
fn apply_weight_rule(
    weights: &mut WeightSet,
    predicted: DocumentClass,
    corrected: DocumentClass,
    learning: &LearningConfig,
) -> Vec<DocumentClass> {
    if predicted == corrected {
        debug!("Correct prediction - reinforcing {}", predicted);
        scale_group(weights, predicted, 1.0 + learning.reinforce_factor, None);
        vec![predicted]
    } else {
        debug!("Incorrect prediction - penalizing {}, rewarding {}", predicted, corrected);
        scale_group(
            weights,
            predicted,
            1.0 + learning.penalize_factor,
            Some(learning.min_weight),
        );
        scale_group(weights, corrected, 1.0 + learning.reward_factor, None);
        vec![predicted, corrected]
    }
}

fn scale_group(weights: &mut WeightSet, class: DocumentClass, factor: f64, floor: Option<f64>) {
    let Some(group) = weights.group_mut(class) else {
        return;
    };
    for (name, value) in group.iter_mut() {
        let mut next = *value * factor;
        if let Some(floor) = floor {
            next = next.max(floor);
        }
        if let Some(range) = weight_range(class, name) {
            next = range.clamp_max(next);
        }
        debug!("{}.{}: {:.3} -> {:.3}", class.score_key(), name, value, next);
        *value = next;
    }
}

/// Move thresholds towards the configured percentile of ground-truth scores
fn recalibrate_thresholds(
    history: &FeedbackHistory,
    thresholds: &mut ThresholdSet,
    learning: &LearningConfig,
) -> Vec<ThresholdChange> {
    if history.len() < learning.min_feedback_for_update as usize {
        info!(
            "Not enough feedback for threshold recalibration ({} < {})",
            history.len(),
            learning.min_feedback_for_update
        );
        return Vec::new();
    }

    let mut changes = Vec::new();
    for class in DocumentClass::ALL {
        let samples = history.ground_truth_scores(class);
        if samples.len() < learning.min_samples_per_class as usize {
            debug!("{}: {} samples, threshold kept", class, samples.len());
            continue;
        }
        let Some(candidate) = percentile(&samples, learning.recalibration_percentile) else {
            continue;
        };
        let candidate = THRESHOLD_RANGE.clamp_max(round2(candidate).max(THRESHOLD_RANGE.min));
        let old = thresholds.get(class);

        if (candidate - old).abs() / old.max(0.1) > learning.threshold_hysteresis {
            info!("Updated threshold for {}: {:.2} -> {:.2}", class, old, candidate);
            thresholds.set(class, candidate);
            changes.push(ThresholdChange {
                class,
                old,
                new: candidate,
            });
        }
    }
    changes
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
