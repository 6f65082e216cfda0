//! Recommendation synthesis.
//!
//! Additive guidance over the accumulated validation state. Nothing here
//! touches `is_valid`.

use super::thresholds::{ANALYSIS_CONFIDENCE_THRESHOLD, OVERALL_CONFIDENCE_THRESHOLD};
use crate::knowledge::MIN_PAWN_WEIGHT_GRAMS;
use crate::models::{JewelryAnalysis, ObjectType};

pub fn synthesize(
    analysis: &JewelryAnalysis,
    issues: &[String],
    overall_confidence: f64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if !issues.is_empty() {
        recommendations.push(format!(
            "Repeat the physical inspection at the branch to resolve {} detected issue(s).",
            issues.len()
        ));
    }

    for (attribute, score) in analysis.confidence.as_named() {
        if score < ANALYSIS_CONFIDENCE_THRESHOLD {
            recommendations.push(format!(
                "{} confidence is {:.0}%; {}.",
                attribute_label(attribute),
                score,
                reverification_hint(attribute)
            ));
        }
    }

    if analysis.estimated_weight_grams <= MIN_PAWN_WEIGHT_GRAMS {
        recommendations.push(format!(
            "Weight {:.2} g is at or below the minimum of {:.1} g; consider rejection.",
            analysis.estimated_weight_grams, MIN_PAWN_WEIGHT_GRAMS
        ));
    }

    if analysis.condition.is_lowest_tier() {
        recommendations.push(
            "Condition is Cukup (fair); expect a 5-10% reduction in the final appraised value."
                .to_string(),
        );
    }

    if analysis.object_type == ObjectType::Unknown {
        recommendations.push("Object type was not identified; confirm the item category in person.".to_string());
    }

    if overall_confidence < OVERALL_CONFIDENCE_THRESHOLD {
        recommendations.push(format!(
            "Overall validation confidence is {:.0}%; route to manual review before quoting.",
            overall_confidence * 100.0
        ));
    }

    recommendations
}

fn attribute_label(attribute: &str) -> &'static str {
    match attribute {
        "objectDetection" => "Object type",
        "weightEstimation" => "Weight",
        "karatAnalysis" => "Karat",
        _ => "Condition",
    }
}

fn reverification_hint(attribute: &str) -> &'static str {
    match attribute {
        "objectDetection" => "confirm the item category by hand at the branch",
        "weightEstimation" => "re-verify the weight with a precision scale",
        "karatAnalysis" => "re-verify purity with a precision instrument (XRF or acid test)",
        _ => "re-inspect the item's condition under magnification",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ConfidenceScores};

    fn analysis(weight: f64, condition: Condition, weight_conf: f64, karat_conf: f64) -> JewelryAnalysis {
        JewelryAnalysis {
            object_type: ObjectType::Ring,
            estimated_weight_grams: weight,
            karat: 22,
            condition,
            confidence: ConfidenceScores {
                object_detection: 95.0,
                weight_estimation: weight_conf,
                karat_analysis: karat_conf,
                condition_analysis: 90.0,
            },
            notes: None,
        }
    }

    #[test]
    fn test_clean_state_has_no_recommendations() {
        let recs = synthesize(&analysis(5.0, Condition::Good, 90.0, 90.0), &[], 0.9);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_each_trigger_adds_guidance() {
        let issues = vec!["weight implausible".to_string()];
        let recs = synthesize(&analysis(0.05, Condition::Fair, 60.0, 79.9), &issues, 0.5);

        assert!(recs.iter().any(|r| r.contains("physical inspection")));
        assert!(recs.iter().any(|r| r.contains("precision scale")));
        assert!(recs.iter().any(|r| r.contains("precision instrument")));
        assert!(recs.iter().any(|r| r.contains("below the minimum") && r.contains("consider rejection")));
        assert!(recs.iter().any(|r| r.contains("5-10%")));
        assert!(recs.iter().any(|r| r.contains("manual review")));
    }

    #[test]
    fn test_low_object_and_condition_confidence_add_guidance() {
        let mut item = analysis(5.0, Condition::Good, 95.0, 95.0);
        item.confidence.object_detection = 10.0;
        item.confidence.condition_analysis = 10.0;

        let recs = synthesize(&item, &[], 0.9);

        assert_eq!(recs.len(), 2);
        assert!(recs[0].starts_with("Object type confidence is 10%"));
        assert!(recs[1].starts_with("Condition confidence is 10%"));
    }

    #[test]
    fn test_weight_exactly_at_minimum() {
        let recs = synthesize(&analysis(MIN_PAWN_WEIGHT_GRAMS, Condition::Good, 90.0, 90.0), &[], 0.9);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("consider rejection"));
    }
}
