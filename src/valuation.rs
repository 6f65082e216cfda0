//! Valuation service
//!
//! Prices a `JewelryAnalysis` against the current gold price and wraps the
//! result in an `Estimation` with a fresh ID and a 24 hour validity window.
//! Pure computation; persistence belongs to the caller.

use crate::error::ValuationError;
use crate::models::{
    normalize_karat, Condition, ConfidenceScores, Estimation, EstimationStatus, JewelryAnalysis,
    ObjectType, PriceQuote,
};
use crate::pricing::PricingPolicy;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

pub const ESTIMATION_VALIDITY_HOURS: i64 = 24;

/// Analysis fields as submitted by a client. Everything is optional here so
/// that missing fields become `InvalidAnalysis` instead of a decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default, alias = "estimatedWeightGrams", alias = "weight")]
    pub estimated_weight: Option<f64>,
    #[serde(default)]
    pub karat: Option<i64>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub confidence: Option<ConfidenceScores>,
    #[serde(default, alias = "analysis")]
    pub notes: Option<String>,
}

impl AnalysisInput {
    /// Required: objectType, positive weight, karat. Condition falls back to
    /// Good and missing confidence scores to zero.
    pub fn into_analysis(self) -> Result<JewelryAnalysis> {
        let object_type = self
            .object_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValuationError::InvalidAnalysis("objectType is required".to_string()))?;

        let weight = self
            .estimated_weight
            .ok_or_else(|| ValuationError::InvalidAnalysis("estimatedWeight is required".to_string()))?;

        let karat = self
            .karat
            .ok_or_else(|| ValuationError::InvalidAnalysis("karat is required".to_string()))?;

        let analysis = JewelryAnalysis {
            object_type: ObjectType::parse(object_type),
            estimated_weight_grams: weight,
            karat: normalize_karat(karat),
            condition: self
                .condition
                .as_deref()
                .map(Condition::coerce)
                .unwrap_or(Condition::Good),
            confidence: self.confidence.unwrap_or_default().clamped(),
            notes: self.notes,
        };

        ensure_priceable(&analysis)?;
        Ok(analysis)
    }
}

fn ensure_priceable(analysis: &JewelryAnalysis) -> Result<()> {
    let weight = analysis.estimated_weight_grams;
    if !weight.is_finite() || weight <= 0.0 {
        return Err(ValuationError::InvalidAnalysis(format!(
            "estimatedWeight must be positive, got {}",
            weight
        )));
    }
    if analysis.karat == 0 {
        return Err(ValuationError::InvalidAnalysis("karat is required".to_string()));
    }
    Ok(())
}

/// `EST-<unix millis>-<16 random hex>`. Sortable by creation time; the random
/// half comes from a v4 UUID so concurrent callers need no coordination.
pub fn generate_estimation_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "EST-{}-{}",
        now.timestamp_millis(),
        random[..16].to_uppercase()
    )
}

pub struct ValuationService {
    validity: Duration,
}

impl ValuationService {
    pub fn new() -> Self {
        Self {
            validity: Duration::hours(ESTIMATION_VALIDITY_HOURS),
        }
    }

    pub fn quote(analysis: &JewelryAnalysis, gold_price_per_gram: u64) -> PriceQuote {
        let estimated_gold_value =
            PricingPolicy::gold_value(analysis.estimated_weight_grams, gold_price_per_gram);
        let max_ltv_percent = PricingPolicy::max_ltv_percent(normalize_karat(i64::from(analysis.karat)));
        let max_loan_amount = PricingPolicy::max_loan(estimated_gold_value, max_ltv_percent);
        let admin_fee = PricingPolicy::admin_fee(max_loan_amount);

        PriceQuote {
            gold_price_per_gram,
            estimated_gold_value,
            max_ltv_percent,
            max_loan_amount,
            admin_fee,
            net_loan_amount: PricingPolicy::net_loan(max_loan_amount, admin_fee),
        }
    }

    pub fn estimate(&self, analysis: &JewelryAnalysis, gold_price_per_gram: u64) -> Result<Estimation> {
        self.estimate_at(analysis, gold_price_per_gram, Utc::now())
    }

    pub fn estimate_at(
        &self,
        analysis: &JewelryAnalysis,
        gold_price_per_gram: u64,
        now: DateTime<Utc>,
    ) -> Result<Estimation> {
        ensure_priceable(analysis)?;

        let mut analysis = analysis.clone();
        analysis.karat = normalize_karat(i64::from(analysis.karat));

        let price_calculation = Self::quote(&analysis, gold_price_per_gram);
        debug!(?price_calculation, "Price quote computed");

        let estimation = Estimation {
            estimation_id: generate_estimation_id(now),
            analysis_result: analysis,
            price_calculation,
            application_status: EstimationStatus::Draft,
            created_at: now,
            expires_at: now + self.validity,
        };

        info!(
            estimation_id = %estimation.estimation_id,
            net_loan = estimation.price_calculation.net_loan_amount,
            "Estimation created"
        );

        Ok(estimation)
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}
