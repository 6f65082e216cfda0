//! Core data models for the valuation pipeline

use crate::error::ValuationError;
use crate::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Purities the appraisal accepts. Anything else is coerced to [`DEFAULT_KARAT`].
pub const VALID_KARATS: [u32; 5] = [14, 16, 18, 22, 24];
pub const DEFAULT_KARAT: u32 = 22;

pub const MIN_WEIGHT_GRAMS: f64 = 0.1;
pub const MAX_WEIGHT_GRAMS: f64 = 100.0;

/// Coerce an arbitrary karat reading into the accepted set.
pub fn normalize_karat(karat: i64) -> u32 {
    VALID_KARATS
        .iter()
        .copied()
        .find(|valid| i64::from(*valid) == karat)
        .unwrap_or(DEFAULT_KARAT)
}

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Necklace,
    Ring,
    Bracelet,
    Earring,
    Pendant,
    /// Free-text fallback, treated as a low-confidence signal downstream.
    Unknown,
}

impl ObjectType {
    pub const ALL: [ObjectType; 5] = [
        ObjectType::Necklace,
        ObjectType::Ring,
        ObjectType::Bracelet,
        ObjectType::Earring,
        ObjectType::Pendant,
    ];

    /// Label in the service locale, used on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectType::Necklace => "Kalung",
            ObjectType::Ring => "Cincin",
            ObjectType::Bracelet => "Gelang",
            ObjectType::Earring => "Anting",
            ObjectType::Pendant => "Liontin",
            ObjectType::Unknown => "Unknown",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            ObjectType::Necklace => "necklace",
            ObjectType::Ring => "ring",
            ObjectType::Bracelet => "bracelet",
            ObjectType::Earring => "earring",
            ObjectType::Pendant => "pendant",
            ObjectType::Unknown => "unknown",
        }
    }

    /// Lenient parse of either locale. Earrings are checked before rings
    /// because "earring" contains "ring".
    pub fn parse(value: &str) -> Self {
        let lowered = value.trim().to_lowercase();
        if lowered.is_empty() {
            return ObjectType::Unknown;
        }

        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

        if has_any(&["anting", "earring", "giwang"]) {
            ObjectType::Earring
        } else if has_any(&["kalung", "necklace", "chain"]) {
            ObjectType::Necklace
        } else if has_any(&["gelang", "bracelet", "bangle"]) {
            ObjectType::Bracelet
        } else if has_any(&["liontin", "pendant", "locket"]) {
            ObjectType::Pendant
        } else if has_any(&["cincin", "ring"]) {
            ObjectType::Ring
        } else {
            ObjectType::Unknown
        }
    }

    /// Realistic weight range in grams for the category.
    pub fn typical_weight_range(&self) -> (f64, f64) {
        match self {
            ObjectType::Necklace => (3.0, 50.0),
            ObjectType::Ring => (1.0, 15.0),
            ObjectType::Bracelet => (3.0, 40.0),
            ObjectType::Earring => (0.5, 10.0),
            ObjectType::Pendant => (0.5, 15.0),
            ObjectType::Unknown => (MIN_WEIGHT_GRAMS, MAX_WEIGHT_GRAMS),
        }
    }
}

impl Serialize for ObjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ObjectType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ObjectType::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Excellent,
    Good,
    Fair,
}

impl Condition {
    pub fn label(&self) -> &'static str {
        match self {
            Condition::Excellent => "Sangat Baik",
            Condition::Good => "Baik",
            Condition::Fair => "Cukup",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
        }
    }

    /// Strict parse; `None` for anything outside the rubric.
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_lowercase().replace(['_', '-'], " ");
        match lowered.as_str() {
            "sangat baik" | "excellent" | "very good" => Some(Condition::Excellent),
            "baik" | "good" => Some(Condition::Good),
            "cukup" | "cukup baik" | "fair" => Some(Condition::Fair),
            _ => None,
        }
    }

    /// Parse with the documented default.
    pub fn coerce(value: &str) -> Self {
        Condition::parse(value).unwrap_or(Condition::Good)
    }

    pub fn is_lowest_tier(&self) -> bool {
        matches!(self, Condition::Fair)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Condition::coerce(&raw))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstimationStatus {
    Draft,
    Pending,
    Processing,
    Approved,
    Rejected,
}

impl EstimationStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "DRAFT" => Some(EstimationStatus::Draft),
            "PENDING" => Some(EstimationStatus::Pending),
            "PROCESSING" => Some(EstimationStatus::Processing),
            "APPROVED" => Some(EstimationStatus::Approved),
            "REJECTED" => Some(EstimationStatus::Rejected),
            _ => None,
        }
    }
}

//
// ================= Analysis =================
//

/// Four independent scores, each in [0, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfidenceScores {
    pub object_detection: f64,
    pub weight_estimation: f64,
    pub karat_analysis: f64,
    pub condition_analysis: f64,
}

impl ConfidenceScores {
    pub fn clamped(self) -> Self {
        Self {
            object_detection: clamp_score(self.object_detection),
            weight_estimation: clamp_score(self.weight_estimation),
            karat_analysis: clamp_score(self.karat_analysis),
            condition_analysis: clamp_score(self.condition_analysis),
        }
    }

    pub fn as_named(&self) -> [(&'static str, f64); 4] {
        [
            ("objectDetection", self.object_detection),
            ("weightEstimation", self.weight_estimation),
            ("karatAnalysis", self.karat_analysis),
            ("conditionAnalysis", self.condition_analysis),
        ]
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JewelryAnalysis {
    pub object_type: ObjectType,
    #[serde(rename = "estimatedWeight", alias = "estimatedWeightGrams")]
    pub estimated_weight_grams: f64,
    pub karat: u32,
    pub condition: Condition,
    pub confidence: ConfidenceScores,
    /// Appraiser notes returned alongside the structured fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl JewelryAnalysis {
    pub fn weight_in_typical_range(&self) -> bool {
        let (low, high) = self.object_type.typical_weight_range();
        self.estimated_weight_grams >= low && self.estimated_weight_grams <= high
    }
}

//
// ================= Pricing =================
//

/// Amounts are whole rupiah.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub gold_price_per_gram: u64,
    pub estimated_gold_value: u64,
    pub max_ltv_percent: u32,
    pub max_loan_amount: u64,
    pub admin_fee: u64,
    pub net_loan_amount: u64,
}

/// Read-only gold price figure supplied from outside the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoldPrice {
    pub price_per_gram: u64,
    pub as_of: DateTime<Utc>,
}

//
// ================= Estimation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Estimation {
    pub estimation_id: String,
    pub analysis_result: JewelryAnalysis,
    pub price_calculation: PriceQuote,
    pub application_status: EstimationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Estimation {
    /// Advisory only; the core never refuses an expired estimation.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

//
// ================= Image =================
//

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// A still image as base64 plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    /// Accepts `data:image/...;base64,<payload>` or bare base64.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValuationError::InvalidImage("image payload is empty".to_string()));
        }

        let (mime_type, payload) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    ValuationError::InvalidImage("data URI has no payload".to_string())
                })?;

                let mut parts = header.split(';');
                let mime = parts.next().unwrap_or_default().trim().to_lowercase();
                if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                    return Err(ValuationError::InvalidImage(
                        "data URI must be base64 encoded".to_string(),
                    ));
                }
                if !mime.starts_with("image/") {
                    return Err(ValuationError::InvalidImage(format!(
                        "unsupported media type: {}",
                        mime
                    )));
                }
                (mime, payload)
            }
            None => (DEFAULT_IMAGE_MIME.to_string(), trimmed),
        };

        let data: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

        let decoded = STANDARD
            .decode(data.as_bytes())
            .map_err(|e| ValuationError::InvalidImage(format!("invalid base64: {}", e)))?;

        if decoded.is_empty() {
            return Err(ValuationError::InvalidImage("image payload is empty".to_string()));
        }

        Ok(Self { mime_type, data })
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
