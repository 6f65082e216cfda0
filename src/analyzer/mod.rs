//! Image analyzer
//!
//! Turns a jewelry photo into a fully populated `JewelryAnalysis`.
//! The multimodal capability does the looking; this module owns the prompt,
//! tolerant parsing of whatever text comes back, and clamping into the
//! domain ranges. A response that cannot be parsed is an `AnalysisFailed`,
//! never a fabricated reading.

use crate::capability::{complete_within, CompletionCapability, CompletionPurpose, CompletionRequest};
use crate::error::ValuationError;
use crate::models::{
    normalize_karat, Condition, ConfidenceScores, EncodedImage, JewelryAnalysis, ObjectType,
    DEFAULT_KARAT, MAX_WEIGHT_GRAMS, MIN_WEIGHT_GRAMS,
};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod parse;

pub use parse::extract_json_payload;

const SYSTEM_PROMPT: &str = "You are a certified gold jewelry appraiser for a pawn service. \
You estimate physical attributes from photos conservatively and answer with JSON only.";

/// Successful analysis plus the capability's raw text for auditing.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: JewelryAnalysis,
    pub raw_response: String,
}

pub struct ImageAnalyzer {
    capability: Arc<dyn CompletionCapability>,
    timeout: Duration,
}

impl ImageAnalyzer {
    pub fn new(capability: Arc<dyn CompletionCapability>, timeout: Duration) -> Self {
        Self { capability, timeout }
    }

    pub async fn analyze(&self, image: EncodedImage) -> Result<AnalysisOutcome> {
        let request = CompletionRequest::text(CompletionPurpose::ImageAnalysis, build_analysis_prompt())
            .with_system(SYSTEM_PROMPT)
            .with_image(image)
            .with_temperature(0.1);

        info!(
            capability = self.capability.name(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Running image analysis"
        );

        let completion = complete_within(self.capability.as_ref(), &request, self.timeout)
            .await
            .map_err(|e| {
                warn!(error = %e, "Image analysis capability failed");
                ValuationError::AnalysisFailed(e.to_string())
            })?;

        let analysis = parse_analysis_response(&completion.text)?;

        info!(
            object_type = %analysis.object_type,
            weight = analysis.estimated_weight_grams,
            karat = analysis.karat,
            condition = %analysis.condition,
            "Image analysis completed"
        );

        Ok(AnalysisOutcome {
            analysis,
            raw_response: completion.text,
        })
    }
}

/// Deterministic instruction payload for the appraisal capability.
pub fn build_analysis_prompt() -> String {
    let weight_guidance: Vec<String> = ObjectType::ALL
        .iter()
        .map(|object_type| {
            let (low, high) = object_type.typical_weight_range();
            format!(
                "- {} ({}): typically {:.1} - {:.1} grams",
                object_type.label(),
                object_type.english_name(),
                low,
                high
            )
        })
        .collect();

    format!(
        r#"Analyze the gold jewelry in this photo and estimate its attributes.

OBJECT TYPE (choose exactly one):
Kalung (necklace), Cincin (ring), Gelang (bracelet), Anting (earring), Liontin (pendant).
Use "Unknown" only if no jewelry is visible.

REALISTIC WEIGHT RANGES:
{}
Weight must be between {:.1} and {:.1} grams.

KARAT HEURISTICS (choose one of 14, 16, 18, 22, 24):
- 24K: deep saturated orange-yellow, very soft, often plain designs
- 22K: rich warm yellow, traditional designs
- 18K: bright yellow with slight paleness
- 16K: lighter yellow, slightly brassy
- 14K: pale yellow, harder alloy, fine detailing

CONDITION RUBRIC (choose one):
- "Sangat Baik": no visible scratches, dents or discoloration
- "Baik": light surface wear, intact clasps and links
- "Cukup": visible scratches, dents, dull finish or repaired parts

CONFIDENCE: give four independent integer scores from 0 to 100.

Return ONLY valid JSON, no explanation text, in this exact format:
{{
  "objectType": "Kalung",
  "estimatedWeight": 12.5,
  "karat": 22,
  "condition": "Baik",
  "confidence": {{
    "objectDetection": 90,
    "weightEstimation": 75,
    "karatAnalysis": 80,
    "conditionAnalysis": 85
  }},
  "analysis": "short appraisal notes"
}}
"#,
        weight_guidance.join("\n"),
        MIN_WEIGHT_GRAMS,
        MAX_WEIGHT_GRAMS,
    )
}

/// Parse and normalize a capability response.
pub fn parse_analysis_response(raw: &str) -> Result<JewelryAnalysis> {
    let payload = extract_json_payload(raw).ok_or_else(|| {
        ValuationError::AnalysisFailed(format!("no structured payload in response | raw={}", raw))
    })?;

    normalize_payload(&payload).map_err(|e| match e {
        ValuationError::AnalysisFailed(msg) => {
            ValuationError::AnalysisFailed(format!("{} | raw={}", msg, raw))
        }
        other => other,
    })
}

fn field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| payload.get(*k)).filter(|v| !v.is_null())
}

/// Numbers may arrive as JSON numbers or as text like "12,5 gram" or "22K".
fn read_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let numeric: String = s
                .trim()
                .chars()
                .skip_while(|c| !(c.is_ascii_digit() || *c == '-'))
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
                .collect();
            numeric.replace(',', ".").parse::<f64>().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn read_scores(payload: &Value) -> ConfidenceScores {
    let Some(confidence) = field(payload, &["confidence", "confidenceScores"]) else {
        return ConfidenceScores::default();
    };

    let score = |keys: &[&str]| field(confidence, keys).and_then(read_number).unwrap_or(0.0);

    let mut scores = ConfidenceScores {
        object_detection: score(&["objectDetection", "object_detection"]),
        weight_estimation: score(&["weightEstimation", "weight_estimation"]),
        karat_analysis: score(&["karatAnalysis", "karat_analysis"]),
        condition_analysis: score(&["conditionAnalysis", "condition_analysis"]),
    };

    // fractions in [0, 1] mean the model answered on the wrong scale
    let values = scores.as_named().map(|(_, v)| v);
    if values.iter().any(|v| *v > 0.0) && values.iter().all(|v| *v <= 1.0) {
        scores = ConfidenceScores {
            object_detection: scores.object_detection * 100.0,
            weight_estimation: scores.weight_estimation * 100.0,
            karat_analysis: scores.karat_analysis * 100.0,
            condition_analysis: scores.condition_analysis * 100.0,
        };
    }

    scores.clamped()
}

fn normalize_payload(payload: &Value) -> Result<JewelryAnalysis> {
    if !payload.is_object() {
        return Err(ValuationError::AnalysisFailed(
            "structured payload is not an object".to_string(),
        ));
    }

    let weight = field(payload, &["estimatedWeight", "estimatedWeightGrams", "weight", "weightGrams"])
        .and_then(read_number)
        .ok_or_else(|| {
            ValuationError::AnalysisFailed("response has no weight estimate".to_string())
        })?;

    let object_type = field(payload, &["objectType", "object_type", "type"])
        .and_then(Value::as_str)
        .map(ObjectType::parse)
        .unwrap_or(ObjectType::Unknown);

    let karat = field(payload, &["karat", "purity"])
        .and_then(read_number)
        .map(|k| normalize_karat(k.round() as i64))
        .unwrap_or(DEFAULT_KARAT);

    let condition = field(payload, &["condition"])
        .and_then(Value::as_str)
        .map(Condition::coerce)
        .unwrap_or(Condition::Good);

    let notes = field(payload, &["analysis", "notes", "description"])
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let clamped_weight = weight.clamp(MIN_WEIGHT_GRAMS, MAX_WEIGHT_GRAMS);
    if clamped_weight != weight {
        debug!(raw = weight, clamped = clamped_weight, "Weight clamped into domain");
    }

    Ok(JewelryAnalysis {
        object_type,
        estimated_weight_grams: clamped_weight,
        karat,
        condition,
        confidence: read_scores(payload),
        notes,
    })
}
