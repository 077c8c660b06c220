//! Shared types used across modules
//!
//! Class identity lives here so that the scoring, learning and
//! configuration modules agree on one mapping between a class name
//! (used for thresholds and feedback) and its score key (used for
//! weight groups and per-class scores).

use serde::{Deserialize, Serialize};

/// Document category an image can be classified into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentClass {
    WorkReport,
    Typeplate,
    Document,
    Photo,
}

impl DocumentClass {
    /// All classes in decision-priority order (highest first, fallback last)
    pub const ALL: [DocumentClass; 4] = [
        DocumentClass::WorkReport,
        DocumentClass::Typeplate,
        DocumentClass::Document,
        DocumentClass::Photo,
    ];

    /// Class name as used in thresholds and feedback records
    pub fn name(&self) -> &'static str {
        match self {
            DocumentClass::WorkReport => "work_report",
            DocumentClass::Typeplate => "typeplate",
            DocumentClass::Document => "document",
            DocumentClass::Photo => "photo",
        }
    }

    /// Score key as used in weight groups and score maps
    pub fn score_key(&self) -> &'static str {
        match self {
            DocumentClass::WorkReport => "WR",
            DocumentClass::Typeplate => "TP",
            DocumentClass::Document => "DOC",
            DocumentClass::Photo => "PHOTO",
        }
    }

    /// Parse from a class name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "work_report" => Some(DocumentClass::WorkReport),
            "typeplate" => Some(DocumentClass::Typeplate),
            "document" => Some(DocumentClass::Document),
            "photo" => Some(DocumentClass::Photo),
            _ => None,
        }
    }

    /// Parse from a score key
    pub fn from_score_key(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.score_key() == s)
    }
}

impl std::fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DocumentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
            format!("unknown class '{}' (expected one of: {})", s, known.join(", "))
        })
    }
}

/// Per-class scores computed at prediction time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    #[serde(rename = "WR", default)]
    pub work_report: f64,
    #[serde(rename = "TP", default)]
    pub typeplate: f64,
    #[serde(rename = "DOC", default)]
    pub document: f64,
    #[serde(rename = "PHOTO", default)]
    pub photo: f64,
}

impl ClassScores {
    pub fn get(&self, class: DocumentClass) -> f64 {
        match class {
            DocumentClass::WorkReport => self.work_report,
            DocumentClass::Typeplate => self.typeplate,
            DocumentClass::Document => self.document,
            DocumentClass::Photo => self.photo,
        }
    }
}

/// How sure the user is about a correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserConfidence {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for UserConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserConfidence::Low => write!(f, "low"),
            UserConfidence::Medium => write!(f, "medium"),
            UserConfidence::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for UserConfidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(UserConfidence::Low),
            "medium" => Ok(UserConfidence::Medium),
            "high" => Ok(UserConfidence::High),
            other => Err(format!("invalid confidence '{}' (expected low, medium or high)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_and_score_key_mapping() {
        for class in DocumentClass::ALL {
            assert_eq!(DocumentClass::from_name(class.name()), Some(class));
            assert_eq!(DocumentClass::from_score_key(class.score_key()), Some(class));
        }
        assert_eq!(DocumentClass::from_name("invoice"), None);
        assert_eq!(DocumentClass::from_score_key("doc"), None);
    }

    #[test]
    fn test_class_serializes_as_name() {
        let json = serde_json::to_string(&DocumentClass::WorkReport).unwrap();
        assert_eq!(json, "\"work_report\"");
    }

    #[test]
    fn test_scores_use_score_keys() {
        let scores: ClassScores = serde_json::from_str(r#"{"DOC": 2.0, "PHOTO": 0.5}"#).unwrap();
        assert_eq!(scores.get(DocumentClass::Document), 2.0);
        assert_eq!(scores.get(DocumentClass::Photo), 0.5);
        assert_eq!(scores.get(DocumentClass::WorkReport), 0.0);
    }
}
