//! Declared parameter ranges and configuration validation
//!
//! A merged configuration document is accepted only if it deserializes into
//! `ClassifierConfig` and every leaf sits inside its declared range. All
//! violations are collected so the caller gets one precise diagnostic per
//! broken constraint.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::ClassifierConfig;
use crate::types::DocumentClass;

/// Allowed interval for a numeric parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamRange {
    pub min: f64,
    /// `true` means the lower bound itself is not allowed
    pub min_exclusive: bool,
    pub max: f64,
}

impl ParamRange {
    pub const fn closed(min: f64, max: f64) -> Self {
        Self { min, min_exclusive: false, max }
    }

    pub const fn open_min(min: f64, max: f64) -> Self {
        Self { min, min_exclusive: true, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above_min = if self.min_exclusive { value > self.min } else { value >= self.min };
        above_min && value <= self.max
    }

    /// Pull a value back inside the upper bound
    pub fn clamp_max(&self, value: f64) -> f64 {
        value.min(self.max)
    }

    fn check(&self, path: &str, value: f64) -> Option<String> {
        if !value.is_finite() {
            return Some(format!("{}: {} is not a finite number", path, value));
        }
        if self.min_exclusive && value <= self.min {
            return Some(format!("{}: {} must be > {}", path, value, self.min));
        }
        if !self.min_exclusive && value < self.min {
            return Some(format!("{}: {} must be >= {}", path, value, self.min));
        }
        if value > self.max {
            return Some(format!("{}: {} must be <= {}", path, value, self.max));
        }
        None
    }
}

/// One declared weight leaf
#[derive(Debug, Clone, Copy)]
pub struct WeightParam {
    pub name: &'static str,
    pub default: f64,
    pub range: ParamRange,
}

const fn param(name: &'static str, default: f64, range: ParamRange) -> WeightParam {
    WeightParam { name, default, range }
}

const WORK_REPORT_PARAMS: &[WeightParam] = &[
    param("text_length_divisor", 500.0, ParamRange::open_min(0.0, 10_000.0)),
    param("text_length_factor", 1.5, ParamRange::open_min(0.0, 100.0)),
    param("keyword_multiplier", 2.0, ParamRange::open_min(0.0, 100.0)),
    param("clip_bonus", 1.0, ParamRange::closed(0.0, 100.0)),
    param("min_text_length", 500.0, ParamRange::closed(0.0, 100_000.0)),
];

const TYPEPLATE_PARAMS: &[WeightParam] = &[
    param("clip_factor", 4.0, ParamRange::open_min(0.0, 100.0)),
    param("keyword_multiplier", 1.5, ParamRange::open_min(0.0, 100.0)),
    param("digit_ratio_factor", 10.0, ParamRange::open_min(0.0, 1000.0)),
    param("line_density_factor", 80.0, ParamRange::open_min(0.0, 1000.0)),
    param("color_uniformity_factor", 5.0, ParamRange::open_min(0.0, 100.0)),
    param("rect_score_factor", 3.0, ParamRange::open_min(0.0, 100.0)),
];

const DOCUMENT_PARAMS: &[WeightParam] = &[
    param("text_length_divisor", 300.0, ParamRange::open_min(0.0, 10_000.0)),
    param("clip_factor", 2.0, ParamRange::open_min(0.0, 100.0)),
];

const PHOTO_PARAMS: &[WeightParam] = &[
    param("low_text_threshold", 20.0, ParamRange::closed(0.0, 1000.0)),
    param("low_text_bonus", 2.0, ParamRange::closed(0.0, 100.0)),
    param("clip_factor", 2.0, ParamRange::open_min(0.0, 100.0)),
];

/// Declared weight leaves of a class group
pub fn weight_params(class: DocumentClass) -> &'static [WeightParam] {
    match class {
        DocumentClass::WorkReport => WORK_REPORT_PARAMS,
        DocumentClass::Typeplate => TYPEPLATE_PARAMS,
        DocumentClass::Document => DOCUMENT_PARAMS,
        DocumentClass::Photo => PHOTO_PARAMS,
    }
}

/// Declared range of a weight leaf, if the leaf exists
pub fn weight_range(class: DocumentClass, name: &str) -> Option<ParamRange> {
    weight_params(class)
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.range)
}

pub const THRESHOLD_RANGE: ParamRange = ParamRange::closed(0.0, 1000.0);

/// Rejected configuration, with one entry per violated constraint
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

impl ValidationError {
    pub fn single(issue: impl Into<String>) -> Self {
        Self { issues: vec![issue.into()] }
    }
}

/// Validate a merged configuration document and return its typed view
pub fn validate(value: &Value) -> Result<ClassifierConfig, ValidationError> {
    let config: ClassifierConfig = serde_json::from_value(value.clone())
        .map_err(|e| ValidationError::single(format!("schema: {}", e)))?;

    let mut issues = Vec::new();

    if config.version.trim().is_empty() {
        issues.push("version: must not be empty".to_string());
    }

    check_thresholds(&config, &mut issues);
    check_weights(&config, &mut issues);
    if config.record_store.base_url.trim().is_empty() {
        issues.push("record_store.base_url: must not be empty".to_string());
    }
    for (path, value, range) in scalar_params(&config) {
        push(&mut issues, range.check(path, value));
    }

    if issues.is_empty() {
        Ok(config)
    } else {
        Err(ValidationError { issues })
    }
}

fn push(issues: &mut Vec<String>, issue: Option<String>) {
    if let Some(issue) = issue {
        issues.push(issue);
    }
}

fn check_thresholds(config: &ClassifierConfig, issues: &mut Vec<String>) {
    let known: BTreeSet<&str> = DocumentClass::ALL.iter().map(|c| c.name()).collect();
    for key in config.thresholds.as_map().keys() {
        if !known.contains(key.as_str()) {
            issues.push(format!("thresholds.{}: unknown class", key));
        }
    }
    for class in DocumentClass::ALL {
        let path = format!("thresholds.{}", class.name());
        match config.thresholds.as_map().get(class.name()) {
            Some(value) => push(issues, THRESHOLD_RANGE.check(&path, *value)),
            None => issues.push(format!("{}: missing", path)),
        }
    }
}

fn check_weights(config: &ClassifierConfig, issues: &mut Vec<String>) {
    for key in config.weights.groups().keys() {
        if DocumentClass::from_score_key(key).is_none() {
            issues.push(format!("weights.{}: unknown weight group", key));
        }
    }
    for class in DocumentClass::ALL {
        let group_path = format!("weights.{}", class.score_key());
        let Some(group) = config.weights.group(class) else {
            issues.push(format!("{}: missing", group_path));
            continue;
        };
        let declared = weight_params(class);
        for name in group.keys() {
            if !declared.iter().any(|p| p.name == name) {
                issues.push(format!("{}.{}: unknown parameter", group_path, name));
            }
        }
        for p in declared {
            let path = format!("{}.{}", group_path, p.name);
            match group.get(p.name) {
                Some(value) => push(issues, p.range.check(&path, *value)),
                None => issues.push(format!("{}: missing", path)),
            }
        }
    }
}

/// Numeric leaves outside the weight and threshold tables: path, value, range
fn scalar_params(config: &ClassifierConfig) -> Vec<(&'static str, f64, ParamRange)> {
    let l = &config.learning;
    let r = &config.record_store;
    let drift = ParamRange::closed(0.0, 10_000.0);
    vec![
        ("learning.learning_rate", l.learning_rate, ParamRange::closed(0.001, 1.0)),
        ("learning.reinforce_factor", l.reinforce_factor, ParamRange::closed(0.0, 1.0)),
        ("learning.penalize_factor", l.penalize_factor, ParamRange::closed(-1.0, 0.0)),
        ("learning.reward_factor", l.reward_factor, ParamRange::closed(0.0, 1.0)),
        ("learning.threshold_recalc_interval", l.threshold_recalc_interval as f64, ParamRange::closed(1.0, 1000.0)),
        ("learning.min_feedback_for_update", l.min_feedback_for_update as f64, ParamRange::closed(1.0, 100.0)),
        ("learning.weight_sync_interval", l.weight_sync_interval as f64, ParamRange::closed(1.0, 1000.0)),
        ("learning.min_weight", l.min_weight, ParamRange::open_min(0.0, 10.0)),
        ("learning.min_samples_per_class", l.min_samples_per_class as f64, ParamRange::closed(1.0, 1000.0)),
        ("learning.recalibration_percentile", l.recalibration_percentile, ParamRange::closed(0.0, 100.0)),
        ("learning.threshold_hysteresis", l.threshold_hysteresis, ParamRange::closed(0.0, 1.0)),
        ("learning.recent_events", l.recent_events as f64, ParamRange::closed(1.0, 1000.0)),
        ("record_store.timeout_secs", r.timeout_secs as f64, ParamRange::closed(1.0, 300.0)),
        ("record_store.retry_attempts", r.retry_attempts as f64, ParamRange::closed(0.0, 10.0)),
        ("record_store.retry_delay_ms", r.retry_delay_ms as f64, ParamRange::closed(0.0, 60_000.0)),
        ("safety.weight_drift_warn_pct", config.safety.weight_drift_warn_pct, drift),
        ("safety.threshold_drift_warn_pct", config.safety.threshold_drift_warn_pct, drift),
    ]
}

/// A numeric parameter as published to schema consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSchema {
    pub default: f64,
    #[serde(flatten)]
    pub range: ParamRange,
}

/// Every declared parameter with its default and range, for UI generation
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSchema {
    pub version: String,
    /// Weight group key (`WR`, `TP`, `DOC`, `PHOTO`) to its parameters
    pub weights: BTreeMap<&'static str, BTreeMap<&'static str, ParamSchema>>,
    pub thresholds: BTreeMap<&'static str, ParamSchema>,
    /// Remaining numeric parameters by dotted path
    pub parameters: BTreeMap<&'static str, ParamSchema>,
    /// String parameters that must not be empty
    pub required_strings: Vec<&'static str>,
}

pub fn describe() -> ConfigSchema {
    let defaults = ClassifierConfig::default();

    let weights = DocumentClass::ALL
        .iter()
        .map(|class| {
            let params = weight_params(*class)
                .iter()
                .map(|p| (p.name, ParamSchema { default: p.default, range: p.range }))
                .collect();
            (class.score_key(), params)
        })
        .collect();

    let thresholds = DocumentClass::ALL
        .iter()
        .map(|class| {
            let default = defaults.thresholds.get(*class);
            (class.name(), ParamSchema { default, range: THRESHOLD_RANGE })
        })
        .collect();

    let parameters = scalar_params(&defaults)
        .into_iter()
        .map(|(path, default, range)| (path, ParamSchema { default, range }))
        .collect();

    ConfigSchema {
        version: defaults.version,
        weights,
        thresholds,
        parameters,
        required_strings: vec!["version", "record_store.base_url"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::merge::deep_merge;
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        let config = validate(&ClassifierConfig::defaults_value()).unwrap();
        assert_eq!(config, ClassifierConfig::default());
    }

    #[test]
    fn test_out_of_range_weight_is_reported_with_path() {
        let value = deep_merge(
            &ClassifierConfig::defaults_value(),
            &json!({"weights": {"TP": {"clip_factor": 0.0}}}),
        );
        let err = validate(&value).unwrap_err();
        assert_eq!(err.issues, vec!["weights.TP.clip_factor: 0 must be > 0".to_string()]);
    }

    #[test]
    fn test_all_violations_are_collected() {
        let value = deep_merge(
            &ClassifierConfig::defaults_value(),
            &json!({
                "thresholds": {"document": -1.0},
                "learning": {"penalize_factor": 0.5},
                "weights": {"DOC": {"bogus": 1.0}}
            }),
        );
        let err = validate(&value).unwrap_err();
        assert_eq!(err.issues.len(), 3);
        assert!(err.issues.iter().any(|i| i.starts_with("thresholds.document")));
        assert!(err.issues.iter().any(|i| i.starts_with("learning.penalize_factor")));
        assert!(err.issues.iter().any(|i| i == "weights.DOC.bogus: unknown parameter"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let value = deep_merge(&ClassifierConfig::defaults_value(), &json!({"telemetry": {}}));
        let err = validate(&value).unwrap_err();
        assert!(err.issues[0].starts_with("schema:"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let value = deep_merge(
            &ClassifierConfig::defaults_value(),
            &json!({"learning": {"threshold_recalc_interval": "often"}}),
        );
        assert!(validate(&value).is_err());
    }

    #[test]
    fn test_describe_covers_every_declared_parameter() {
        let schema = describe();
        assert_eq!(schema.weights.len(), 4);
        assert_eq!(schema.weights["TP"].len(), TYPEPLATE_PARAMS.len());
        assert_eq!(schema.weights["TP"]["clip_factor"].default, 4.0);
        assert!(schema.weights["TP"]["clip_factor"].range.min_exclusive);
        assert_eq!(schema.thresholds["document"].default, 1.5);
        assert_eq!(schema.parameters["learning.min_weight"].range.max, 10.0);
        assert_eq!(schema.parameters["record_store.retry_attempts"].default, 3.0);
        assert!(schema.parameters.contains_key("safety.threshold_drift_warn_pct"));

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["weights"]["DOC"]["clip_factor"]["max"], 100.0);
        assert_eq!(json["thresholds"]["typeplate"]["default"], 3.0);
    }

    #[test]
    fn test_range_bounds() {
        let open = ParamRange::open_min(0.0, 100.0);
        assert!(!open.contains(0.0));
        assert!(open.contains(100.0));
        let closed = ParamRange::closed(0.0, 100.0);
        assert!(closed.contains(0.0));
        assert!(!closed.contains(100.5));
        assert_eq!(closed.clamp_max(250.0), 100.0);
    }
}
