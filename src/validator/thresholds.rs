//! Confidence thresholds used by the reflective validator.
//!
//! Kept per stage on purpose; they are not one tunable.

/// Retrieval and generation report success at or above this confidence.
pub const STAGE_SUCCESS_CONFIDENCE: f64 = 0.7;

/// Generation confidence multiplier when no rules were retrieved.
pub const UNGROUNDED_GENERATION_FACTOR: f64 = 0.5;

pub const REFLECTION_CLEAN_CONFIDENCE: f64 = 0.9;
pub const REFLECTION_PENALTY_PER_ISSUE: f64 = 0.15;
pub const REFLECTION_MIN_CONFIDENCE: f64 = 0.3;

pub const APPROVED_CONFIDENCE: f64 = 0.95;
pub const REQUIRES_REVIEW_CONFIDENCE: f64 = 0.70;
pub const REJECTED_CONFIDENCE: f64 = 0.30;

/// Per-attribute analysis score (0-100) under which re-verification is advised.
pub const ANALYSIS_CONFIDENCE_THRESHOLD: f64 = 80.0;

/// Overall verdict confidence under which manual review is advised.
pub const OVERALL_CONFIDENCE_THRESHOLD: f64 = 0.7;
