//! Scoring Engine - maps a feature snapshot to a classification decision
//!
//! Pure functions over a read-only `WeightSet` / `ThresholdSet`. Callers
//! take one `Arc<ClassifierConfig>` snapshot per request and may score
//! concurrently against it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ThresholdSet, WeightSet};
use crate::types::{ClassScores, DocumentClass};

/// Well-known signal names produced by the feature providers
pub mod signals {
    pub const TEXT_LENGTH: &str = "text_length";
    pub const WORK_REPORT_KEYWORD: &str = "work_report_keyword";
    pub const WORK_REPORT_KEYWORD_HITS: &str = "work_report_keyword_hits";
    pub const TYPEPLATE_KEYWORD_COUNT: &str = "typeplate_keyword_count";
    pub const DIGIT_RATIO: &str = "digit_ratio";
    pub const LINE_DENSITY: &str = "line_density";
    pub const COLOR_UNIFORMITY: &str = "color_uniformity";
    pub const LINE_SCORE: &str = "line_score";
    pub const CLIP_CONFIDENCE: &str = "clip_confidence";
    pub const CLIP_IS_DOCUMENT: &str = "clip_is_document";
    pub const CLIP_IS_PHOTO: &str = "clip_is_photo";
    pub const CLIP_IS_TYPEPLATE: &str = "clip_is_typeplate";
}

/// Base score awarded once a work-report keyword is present
const WORK_REPORT_BASE: f64 = 5.0;
const CONFIDENCE_CAP: f64 = 0.95;
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// One signal value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Signal {
    Flag(bool),
    Number(f64),
}

impl From<bool> for Signal {
    fn from(v: bool) -> Self {
        Signal::Flag(v)
    }
}

impl From<f64> for Signal {
    fn from(v: f64) -> Self {
        Signal::Number(v)
    }
}

/// Immutable signals for one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSnapshot {
    signals: BTreeMap<String, Signal>,
}

impl FeatureSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<Signal>) -> Self {
        self.signals.insert(name.to_string(), value.into());
        self
    }

    /// Numeric view; flags read as 0/1 and missing signals as 0
    pub fn number(&self, name: &str) -> f64 {
        match self.signals.get(name) {
            Some(Signal::Number(v)) if v.is_finite() => *v,
            Some(Signal::Flag(true)) => 1.0,
            _ => 0.0,
        }
    }

    /// Boolean view; non-zero numbers read as true and missing signals as false
    pub fn flag(&self, name: &str) -> bool {
        match self.signals.get(name) {
            Some(Signal::Flag(v)) => *v,
            Some(Signal::Number(v)) => *v != 0.0,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Result of scoring one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub predicted_class: DocumentClass,
    pub confidence: f64,
    pub scores: ClassScores,
}

/// Score a snapshot and apply the priority decision rule
pub fn classify(features: &FeatureSnapshot, weights: &WeightSet, thresholds: &ThresholdSet) -> Classification {
    let scores = compute_scores(features, weights);
    let (predicted_class, confidence) = decide(&scores, thresholds);
    Classification {
        predicted_class,
        confidence,
        scores,
    }
}

/// Per-class weighted linear scores
pub fn compute_scores(features: &FeatureSnapshot, weights: &WeightSet) -> ClassScores {
    use signals::*;

    let w = |class, param| weights.get(class, param);
    let text_length = features.number(TEXT_LENGTH);
    let clip_confidence = features.number(CLIP_CONFIDENCE);
    let keyword_count = features.number(TYPEPLATE_KEYWORD_COUNT);
    let digit_ratio = features.number(DIGIT_RATIO);

    let work_report = if features.flag(WORK_REPORT_KEYWORD) {
        let wr = DocumentClass::WorkReport;
        let mut score = WORK_REPORT_BASE + features.number(WORK_REPORT_KEYWORD_HITS) * w(wr, "keyword_multiplier");
        if text_length > w(wr, "min_text_length") {
            score += w(wr, "text_length_factor");
        }
        score
    } else {
        0.0
    };

    let tp = DocumentClass::Typeplate;
    let mut typeplate = keyword_count * w(tp, "keyword_multiplier")
        + digit_ratio * w(tp, "digit_ratio_factor")
        + features.number(LINE_DENSITY) * w(tp, "line_density_factor")
        + features.number(COLOR_UNIFORMITY) * w(tp, "color_uniformity_factor")
        + features.number(LINE_SCORE) * w(tp, "rect_score_factor");
    if features.flag(CLIP_IS_TYPEPLATE) {
        typeplate += clip_confidence * w(tp, "clip_factor");
    }

    let doc = DocumentClass::Document;
    let divisor = w(doc, "text_length_divisor");
    let mut document = if divisor > 0.0 { text_length / divisor } else { 0.0 };
    if features.flag(CLIP_IS_DOCUMENT) {
        document += clip_confidence * w(doc, "clip_factor");
    }

    let ph = DocumentClass::Photo;
    let mut photo = 0.0;
    if text_length < w(ph, "low_text_threshold") {
        photo += w(ph, "low_text_bonus");
    }
    if keyword_count == 0.0 {
        photo += 1.0;
    }
    if digit_ratio == 0.0 {
        photo += 1.0;
    }
    if features.flag(CLIP_IS_PHOTO) {
        photo += clip_confidence * w(ph, "clip_factor");
    }

    ClassScores {
        work_report,
        typeplate,
        document,
        photo,
    }
}

/// Priority-ordered decision: work report, typeplate, document, then photo
pub fn decide(scores: &ClassScores, thresholds: &ThresholdSet) -> (DocumentClass, f64) {
    let wr = scores.work_report;
    let tp = scores.typeplate;
    let doc = scores.document;
    let photo = scores.photo;

    if wr >= thresholds.get(DocumentClass::WorkReport) {
        return (DocumentClass::WorkReport, (wr / 10.0).min(CONFIDENCE_CAP));
    }
    if tp > doc.max(photo) && tp >= thresholds.get(DocumentClass::Typeplate) {
        return (DocumentClass::Typeplate, (tp / 15.0).min(CONFIDENCE_CAP));
    }
    if doc > photo && doc >= thresholds.get(DocumentClass::Document) {
        return (DocumentClass::Document, (doc / 8.0).min(CONFIDENCE_CAP));
    }
    (DocumentClass::Photo, FALLBACK_CONFIDENCE)
}
