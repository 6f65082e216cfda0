//! Reflective validator
//!
//! Cross-checks a priced estimate against the regulatory knowledge base in
//! four strictly sequential stages:
//!
//! RETRIEVAL → GENERATION → REFLECTION → VALIDATION
//!
//! Every stage always runs. A stage whose external call fails reports
//! `success = false, confidence = 0.0` and the next stage works with whatever
//! the earlier ones produced. The verdict is diagnostic, not a gate.

use crate::capability::{
    complete_within, search_within, CompletionCapability, CompletionPurpose, CompletionRequest,
    RetrievalCapability,
};
use crate::knowledge::{RegulationEntry, RetrievalQuery};
use crate::models::{Estimation, JewelryAnalysis, PriceQuote};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod recommendations;
mod stages;
pub mod thresholds;
mod verdict;

pub use verdict::{StepResult, ValidationDecision, ValidationVerdict};

use verdict::degraded_stage_names;

use stages::GROUNDED_SYSTEM_PROMPT;
use thresholds::*;

pub struct ReflectiveValidator {
    retrieval: Arc<dyn RetrievalCapability>,
    completion: Arc<dyn CompletionCapability>,
    timeout: Duration,
}

impl ReflectiveValidator {
    pub fn new(
        retrieval: Arc<dyn RetrievalCapability>,
        completion: Arc<dyn CompletionCapability>,
        timeout: Duration,
    ) -> Self {
        Self {
            retrieval,
            completion,
            timeout,
        }
    }

    pub async fn validate(&self, estimation: &Estimation) -> ValidationVerdict {
        info!(estimation_id = %estimation.estimation_id, "Starting reflective validation");
        self.validate_analysis(&estimation.analysis_result, &estimation.price_calculation)
            .await
    }

    /// Runs all four stages. Never fails; degraded stages are recorded in the verdict.
    pub async fn validate_analysis(
        &self,
        analysis: &JewelryAnalysis,
        quote: &PriceQuote,
    ) -> ValidationVerdict {
        let retrieval = self.retrieve(analysis).await;
        log_stage("retrieval", retrieval.success, retrieval.confidence);

        let generation = self.generate(analysis, quote, &retrieval.payload).await;
        log_stage("generation", generation.success, generation.confidence);

        let reflection = self
            .reflect(analysis, quote, &retrieval.payload, &generation.payload)
            .await;
        log_stage("reflection", reflection.success, reflection.confidence);

        let degraded = degraded_stage_names([
            ("retrieval", retrieval.success),
            ("generation", generation.success),
            ("reflection", reflection.success),
        ]);

        let validation = self
            .decide(analysis, quote, &reflection.payload, &degraded)
            .await;
        log_stage("validation", validation.success, validation.confidence);

        let overall_confidence = ValidationVerdict::overall_confidence_of([
            retrieval.confidence,
            generation.confidence,
            reflection.confidence,
            validation.confidence,
        ]);
        let is_valid =
            retrieval.success && generation.success && reflection.success && validation.success;
        let recommendations =
            recommendations::synthesize(analysis, &reflection.payload, overall_confidence);

        let verdict = ValidationVerdict {
            retrieval,
            generation,
            reflection,
            validation,
            overall_confidence,
            is_valid,
            recommendations,
        };

        info!(
            is_valid,
            overall_confidence,
            decision = verdict.decision().token(),
            degraded = ?verdict.degraded_stages(),
            recommendation_count = verdict.recommendations.len(),
            "Reflective validation completed"
        );

        verdict
    }

    async fn retrieve(&self, analysis: &JewelryAnalysis) -> StepResult<Vec<RegulationEntry>> {
        let query = RetrievalQuery::for_item(analysis.object_type, analysis.karat, analysis.condition);

        match search_within(self.retrieval.as_ref(), &query, self.timeout).await {
            Ok(entries) => {
                let rules = stages::relevant_rules(entries, analysis.karat);
                let confidence = stages::coverage(&rules);
                StepResult::new(confidence >= STAGE_SUCCESS_CONFIDENCE, confidence, rules)
            }
            Err(e) => {
                warn!(error = %e, "Retrieval stage degraded");
                StepResult::degraded(Vec::new(), format!("retrieval unavailable: {}", e))
            }
        }
    }

    async fn generate(
        &self,
        analysis: &JewelryAnalysis,
        quote: &PriceQuote,
        rules: &[RegulationEntry],
    ) -> StepResult<String> {
        let request = CompletionRequest::text(
            CompletionPurpose::Generation,
            stages::generation_prompt(analysis, quote, rules),
        )
        .with_system(GROUNDED_SYSTEM_PROMPT);

        match complete_within(self.completion.as_ref(), &request, self.timeout).await {
            Ok(completion) => {
                let narrative = completion.text.trim().to_string();
                let grounding = if rules.is_empty() {
                    UNGROUNDED_GENERATION_FACTOR
                } else {
                    1.0
                };
                let confidence = f64::from(completion.confidence) * grounding;
                let success = !narrative.is_empty() && confidence >= STAGE_SUCCESS_CONFIDENCE;
                StepResult::new(success, confidence, narrative)
            }
            Err(e) => {
                warn!(error = %e, "Generation stage degraded");
                StepResult::degraded(String::new(), format!("generation unavailable: {}", e))
            }
        }
    }

    async fn reflect(
        &self,
        analysis: &JewelryAnalysis,
        quote: &PriceQuote,
        rules: &[RegulationEntry],
        narrative: &str,
    ) -> StepResult<Vec<String>> {
        let mut issues = stages::quote_contradictions(analysis, quote, rules);
        let notes = stages::pre_check_notes(analysis);

        let request = CompletionRequest::text(
            CompletionPurpose::Reflection,
            stages::reflection_prompt(analysis, quote, narrative, &notes),
        )
        .with_system(GROUNDED_SYSTEM_PROMPT);

        match complete_within(self.completion.as_ref(), &request, self.timeout).await {
            Ok(completion) => {
                for issue in stages::parse_issue_list(&completion.text) {
                    if !issues.contains(&issue) {
                        issues.push(issue);
                    }
                }

                let confidence = if issues.is_empty() {
                    REFLECTION_CLEAN_CONFIDENCE
                } else {
                    (REFLECTION_CLEAN_CONFIDENCE
                        - REFLECTION_PENALTY_PER_ISSUE * issues.len() as f64)
                        .max(REFLECTION_MIN_CONFIDENCE)
                };
                StepResult::new(issues.is_empty(), confidence, issues)
            }
            Err(e) => {
                warn!(error = %e, "Reflection stage degraded");
                StepResult::degraded(issues, format!("reflection unavailable: {}", e))
            }
        }
    }

    async fn decide(
        &self,
        analysis: &JewelryAnalysis,
        quote: &PriceQuote,
        issues: &[String],
        degraded: &[&str],
    ) -> StepResult<ValidationDecision> {
        let request = CompletionRequest::text(
            CompletionPurpose::Validation,
            stages::validation_prompt(analysis, quote, issues, degraded),
        )
        .with_system(GROUNDED_SYSTEM_PROMPT)
        .with_temperature(0.0);

        match complete_within(self.completion.as_ref(), &request, self.timeout).await {
            Ok(completion) => {
                if ValidationDecision::from_token(&completion.text).is_none() {
                    warn!(raw = %completion.text, "Unclassifiable decision, defaulting to review");
                }
                let decision = ValidationDecision::classify(&completion.text);

                match decision {
                    ValidationDecision::Approved => StepResult::new(true, APPROVED_CONFIDENCE, decision),
                    ValidationDecision::RequiresReview => {
                        StepResult::new(true, REQUIRES_REVIEW_CONFIDENCE, decision)
                    }
                    ValidationDecision::Rejected => StepResult::new(false, REJECTED_CONFIDENCE, decision),
                }
            }
            Err(e) => {
                warn!(error = %e, "Validation stage degraded");
                StepResult::degraded(
                    ValidationDecision::RequiresReview,
                    format!("validation unavailable: {}", e),
                )
            }
        }
    }
}

fn log_stage(stage: &'static str, success: bool, confidence: f64) {
    if success {
        info!(stage, confidence, "Validation stage passed");
    } else {
        warn!(stage, confidence, "Validation stage degraded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Completion, MockCompletion};
    use crate::error::ValuationError;
    use crate::knowledge::InMemoryKnowledgeBase;
    use crate::models::{Condition, ConfidenceScores, ObjectType};
    use crate::valuation::ValuationService;
    use crate::Result;
    use async_trait::async_trait;

    struct UnreachableRetrieval;

    #[async_trait]
    impl RetrievalCapability for UnreachableRetrieval {
        async fn search(&self, _query: &RetrievalQuery) -> Result<Vec<RegulationEntry>> {
            Err(ValuationError::Capability("knowledge service unreachable".to_string()))
        }
    }

    fn estimation(weight: f64, condition: Condition) -> Estimation {
        let analysis = JewelryAnalysis {
            object_type: ObjectType::Necklace,
            estimated_weight_grams: weight,
            karat: 22,
            condition,
            confidence: ConfidenceScores {
                object_detection: 95.0,
                weight_estimation: 88.0,
                karat_analysis: 90.0,
                condition_analysis: 92.0,
            },
            notes: None,
        };
        ValuationService::new().estimate(&analysis, 1_250_000).unwrap()
    }

    fn validator(
        retrieval: Arc<dyn RetrievalCapability>,
        completion: MockCompletion,
    ) -> ReflectiveValidator {
        ReflectiveValidator::new(retrieval, Arc::new(completion), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_clean_estimate_is_valid() {
        let v = validator(Arc::new(InMemoryKnowledgeBase::default()), MockCompletion::appraiser());
        let verdict = v.validate(&estimation(12.5, Condition::Good)).await;

        assert!(verdict.retrieval.success);
        assert_eq!(verdict.retrieval.confidence, 1.0);
        assert!(verdict.generation.success);
        assert!(verdict.reflection.success);
        assert_eq!(verdict.decision(), ValidationDecision::Approved);
        assert!(verdict.is_valid);
        assert!(verdict.recommendations.is_empty());

        let expected = (1.0 + 0.9 + REFLECTION_CLEAN_CONFIDENCE + APPROVED_CONFIDENCE) / 4.0;
        assert!((verdict.overall_confidence - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_gracefully() {
        let v = validator(Arc::new(UnreachableRetrieval), MockCompletion::appraiser());
        let verdict = v.validate(&estimation(12.5, Condition::Good)).await;

        assert!(!verdict.retrieval.success);
        assert_eq!(verdict.retrieval.confidence, 0.0);
        assert!(verdict.retrieval.payload.is_empty());
        assert!(verdict.retrieval.error.is_some());

        // later stages still ran
        assert!(!verdict.generation.payload.is_empty());
        assert!((verdict.generation.confidence - 0.45).abs() < 1e-6);
        assert!(!verdict.generation.success);
        assert!(verdict.reflection.success);
        assert_eq!(verdict.decision(), ValidationDecision::Approved);
        assert!(!verdict.is_valid);
        assert!(verdict.recommendations.iter().any(|r| r.contains("manual review")));
    }

    #[tokio::test]
    async fn test_completion_outage_still_returns_complete_verdict() {
        let v = validator(
            Arc::new(InMemoryKnowledgeBase::default()),
            MockCompletion::failing("503 service unavailable"),
        );
        let verdict = v.validate(&estimation(12.5, Condition::Good)).await;

        assert!(verdict.retrieval.success);
        for (success, confidence) in [
            (verdict.generation.success, verdict.generation.confidence),
            (verdict.reflection.success, verdict.reflection.confidence),
            (verdict.validation.success, verdict.validation.confidence),
        ] {
            assert!(!success);
            assert_eq!(confidence, 0.0);
        }
        assert_eq!(verdict.decision(), ValidationDecision::RequiresReview);
        assert!((verdict.overall_confidence - 0.25).abs() < 1e-9);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.degraded_stages(), vec!["generation", "reflection", "validation"]);
    }

    struct StalledCompletion;

    #[async_trait]
    impl CompletionCapability for StalledCompletion {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Completion {
                text: "APPROVED".to_string(),
                confidence: 0.9,
            })
        }
    }

    #[tokio::test]
    async fn test_stalled_completion_times_out_per_stage() {
        let v = ReflectiveValidator::new(
            Arc::new(InMemoryKnowledgeBase::default()),
            Arc::new(StalledCompletion),
            Duration::from_millis(20),
        );
        let verdict = v.validate(&estimation(12.5, Condition::Good)).await;

        assert!(verdict.retrieval.success);
        assert!(verdict.retrieval.error.is_none());
        for (stage, success, confidence, error) in [
            ("generation", verdict.generation.success, verdict.generation.confidence, &verdict.generation.error),
            ("reflection", verdict.reflection.success, verdict.reflection.confidence, &verdict.reflection.error),
            ("validation", verdict.validation.success, verdict.validation.confidence, &verdict.validation.error),
        ] {
            assert!(!success, "{stage} should be degraded");
            assert_eq!(confidence, 0.0, "{stage} confidence");
            assert!(error.is_some(), "{stage} should carry the timeout");
        }
        assert_eq!(verdict.decision(), ValidationDecision::RequiresReview);
        assert_eq!(verdict.degraded_stages(), vec!["generation", "reflection", "validation"]);
        assert!(!verdict.is_valid);
        assert!((verdict.overall_confidence - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_validations_are_independent() {
        let v = validator(Arc::new(InMemoryKnowledgeBase::default()), MockCompletion::appraiser());
        let heavy = estimation(12.5, Condition::Good);
        let light = estimation(0.05, Condition::Fair);

        let (heavy_verdict, light_verdict) = tokio::join!(v.validate(&heavy), v.validate(&light));

        assert!(heavy_verdict.is_valid);
        assert!(heavy_verdict.recommendations.is_empty());

        assert!(light_verdict
            .recommendations
            .iter()
            .any(|r| r.contains("below the minimum")));
        assert!(light_verdict.recommendations.iter().any(|r| r.contains("5-10%")));
        assert!(!heavy_verdict
            .recommendations
            .iter()
            .any(|r| r.contains("below the minimum") || r.contains("5-10%")));
    }

    #[tokio::test]
    async fn test_below_minimum_weight_recommends_rejection_but_stays_valid() {
        let v = validator(Arc::new(InMemoryKnowledgeBase::default()), MockCompletion::appraiser());
        let verdict = v.validate(&estimation(0.05, Condition::Good)).await;

        assert!(verdict.is_valid);
        assert!(verdict
            .recommendations
            .iter()
            .any(|r| r.contains("below the minimum") && r.contains("consider rejection")));
    }

    #[tokio::test]
    async fn test_unclassifiable_decision_requires_review() {
        let completion = MockCompletion::from_fn(|request| {
            let text = match request.purpose {
                CompletionPurpose::Validation => "I think this should probably be APPROVED",
                CompletionPurpose::Reflection => "NONE",
                _ => "Eligible under the listed regulations.",
            };
            Ok(Completion {
                text: text.to_string(),
                confidence: 0.9,
            })
        });
        let v = validator(Arc::new(InMemoryKnowledgeBase::default()), completion);
        let verdict = v.validate(&estimation(12.5, Condition::Good)).await;

        assert_eq!(verdict.decision(), ValidationDecision::RequiresReview);
        assert!(verdict.validation.success);
        assert_eq!(verdict.validation.confidence, REQUIRES_REVIEW_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_reflection_issues_flow_into_rejection() {
        let completion = MockCompletion::from_fn(|request| {
            let text = match request.purpose {
                CompletionPurpose::Reflection => "- Weight is implausible for a necklace\n- Clasp appears repaired",
                CompletionPurpose::Validation => {
                    assert!(request.prompt.contains("Weight is implausible"));
                    "REJECTED"
                }
                _ => "Assessment text.",
            };
            Ok(Completion {
                text: text.to_string(),
                confidence: 0.9,
            })
        });
        let v = validator(Arc::new(InMemoryKnowledgeBase::default()), completion);
        let verdict = v.validate(&estimation(12.5, Condition::Fair)).await;

        assert!(!verdict.reflection.success);
        assert_eq!(verdict.reflection.payload.len(), 2);
        assert!((verdict.reflection.confidence - 0.6).abs() < 1e-9);
        assert!(!verdict.validation.success);
        assert_eq!(verdict.validation.confidence, REJECTED_CONFIDENCE);
        assert!(!verdict.is_valid);
        assert!(verdict.recommendations.iter().any(|r| r.contains("physical inspection")));
        assert!(verdict.recommendations.iter().any(|r| r.contains("5-10%")));
    }

    #[tokio::test]
    async fn test_inflated_ltv_is_a_hard_issue() {
        let mut est = estimation(12.5, Condition::Good);
        est.price_calculation.max_ltv_percent = 90;

        let v = validator(Arc::new(InMemoryKnowledgeBase::default()), MockCompletion::appraiser());
        let verdict = v.validate(&est).await;

        assert!(verdict
            .reflection
            .payload
            .iter()
            .any(|issue| issue.contains("exceeds the 80% ceiling")));
        assert!(!verdict.is_valid);
    }
}
