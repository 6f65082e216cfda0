//! Verdict types produced by the reflective validator

use crate::knowledge::RegulationEntry;
use serde::{Deserialize, Serialize};

/// Outcome of one stage. `success == false` is a degraded stage, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult<T> {
    pub success: bool,
    /// In [0, 1].
    pub confidence: f64,
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> StepResult<T> {
    pub fn new(success: bool, confidence: f64, payload: T) -> Self {
        Self {
            success,
            confidence: confidence.clamp(0.0, 1.0),
            payload,
            error: None,
        }
    }

    /// The stage's external call failed.
    pub fn degraded(payload: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            confidence: 0.0,
            payload,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationDecision {
    Approved,
    RequiresReview,
    Rejected,
}

impl ValidationDecision {
    pub fn token(&self) -> &'static str {
        match self {
            ValidationDecision::Approved => "APPROVED",
            ValidationDecision::RequiresReview => "REQUIRES_REVIEW",
            ValidationDecision::Rejected => "REJECTED",
        }
    }

    /// Strict match against the closed token set. Surrounding quotes, code
    /// ticks and trailing punctuation are tolerated; prose is not.
    pub fn from_token(text: &str) -> Option<Self> {
        let normalized = text
            .trim()
            .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.' || c == '*')
            .trim()
            .to_uppercase()
            .replace([' ', '-'], "_");

        match normalized.as_str() {
            "APPROVED" => Some(ValidationDecision::Approved),
            "REQUIRES_REVIEW" => Some(ValidationDecision::RequiresReview),
            "REJECTED" => Some(ValidationDecision::Rejected),
            _ => None,
        }
    }

    /// Unclassifiable output is never read as approval.
    pub fn classify(text: &str) -> Self {
        Self::from_token(text).unwrap_or(ValidationDecision::RequiresReview)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub retrieval: StepResult<Vec<RegulationEntry>>,
    pub generation: StepResult<String>,
    pub reflection: StepResult<Vec<String>>,
    pub validation: StepResult<ValidationDecision>,
    pub overall_confidence: f64,
    pub is_valid: bool,
    pub recommendations: Vec<String>,
}

impl ValidationVerdict {
    /// Unweighted mean of the four stage confidences.
    pub fn overall_confidence_of(confidences: [f64; 4]) -> f64 {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    }

    pub fn decision(&self) -> ValidationDecision {
        self.validation.payload
    }

    pub fn degraded_stages(&self) -> Vec<&'static str> {
        degraded_stage_names([
            ("retrieval", self.retrieval.success),
            ("generation", self.generation.success),
            ("reflection", self.reflection.success),
            ("validation", self.validation.success),
        ])
    }
}

/// Names of the stages that did not succeed, in pipeline order.
pub(crate) fn degraded_stage_names<const N: usize>(stages: [(&'static str, bool); N]) -> Vec<&'static str> {
    stages
        .into_iter()
        .filter(|(_, success)| !success)
        .map(|(name, _)| name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_tokens() {
        assert_eq!(ValidationDecision::classify("APPROVED"), ValidationDecision::Approved);
        assert_eq!(ValidationDecision::classify(" `rejected`. "), ValidationDecision::Rejected);
        assert_eq!(
            ValidationDecision::classify("Requires review"),
            ValidationDecision::RequiresReview
        );
        assert_eq!(
            ValidationDecision::classify("REQUIRES-REVIEW"),
            ValidationDecision::RequiresReview
        );
    }

    #[test]
    fn test_degraded_stage_names_keep_order() {
        let names = degraded_stage_names([("retrieval", false), ("generation", true), ("reflection", false)]);
        assert_eq!(names, vec!["retrieval", "reflection"]);
        assert!(degraded_stage_names([("validation", true)]).is_empty());
    }

    #[test]
    fn test_prose_never_approves() {
        // substring matching would have read these as approval
        for text in [
            "NOT APPROVED",
            "APPROVED, but with caveats",
            "The item is approved.",
            "",
            "maybe",
        ] {
            assert_eq!(
                ValidationDecision::classify(text),
                ValidationDecision::RequiresReview,
                "{:?}",
                text
            );
        }
    }

    #[test]
    fn test_degraded_step() {
        let step: StepResult<Vec<String>> = StepResult::degraded(vec![], "timeout");
        assert!(!step.success);
        assert_eq!(step.confidence, 0.0);
        assert_eq!(step.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_overall_confidence_is_mean() {
        let mean = ValidationVerdict::overall_confidence_of([0.0, 0.8, 0.9, 0.7]);
        assert!((mean - 0.6).abs() < 1e-9);
    }
}
