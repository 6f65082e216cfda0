//! Valuation pipeline
//!
//! IMAGE → ANALYZE → PRICE → VALIDATE? → COMMIT
//!
//! Analysis and pricing are mandatory; their failures abort the request.
//! Reflective validation is optional and best-effort: when it cannot run at
//! all the estimation is still returned, without a verdict. The record is
//! handed to the sink only once everything has finished, so a request that is
//! dropped mid-flight commits nothing.

use crate::analyzer::{AnalysisOutcome, ImageAnalyzer};
use crate::capability::CompletionCapability;
use crate::config::AppConfig;
use crate::error::ValuationError;
use crate::gemini::GeminiClient;
use crate::knowledge::InMemoryKnowledgeBase;
use crate::models::{EncodedImage, Estimation, GoldPrice, JewelryAnalysis};
use crate::store::{EstimationRecord, EstimationSink};
use crate::validator::{ReflectiveValidator, ValidationVerdict};
use crate::valuation::{AnalysisInput, ValuationService};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Source of the current gold price. Read-only from the pipeline's side.
#[async_trait]
pub trait GoldPriceFeed: Send + Sync {
    async fn current(&self) -> Result<GoldPrice>;
}

/// A constant price, typically taken from configuration.
pub struct FixedGoldPriceFeed {
    price: GoldPrice,
}

impl FixedGoldPriceFeed {
    pub fn new(price_per_gram: u64) -> Self {
        Self {
            price: GoldPrice {
                price_per_gram,
                as_of: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl GoldPriceFeed for FixedGoldPriceFeed {
    async fn current(&self) -> Result<GoldPrice> {
        Ok(self.price.clone())
    }
}

/// Response body of a valuation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstimationResponse {
    pub success: bool,
    #[serde(flatten)]
    pub estimation: Estimation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_validation: Option<ValidationVerdict>,
    /// Set when validation was requested but could not run at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_validation_error: Option<String>,
}

/// Response body of an image analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub success: bool,
    pub analysis_result: JewelryAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<String>,
}

impl From<AnalysisOutcome> for AnalysisResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            success: true,
            analysis_result: outcome.analysis,
            raw_analysis: Some(outcome.raw_response),
        }
    }
}

pub struct ValuationPipeline {
    analyzer: Option<ImageAnalyzer>,
    valuation: ValuationService,
    validator: std::result::Result<ReflectiveValidator, String>,
    gold_price: Arc<dyn GoldPriceFeed>,
    sink: Arc<dyn EstimationSink>,
}

impl ValuationPipeline {
    /// A pipeline that can only price submitted analyses. Attach the
    /// capabilities with `with_analyzer` and `with_validator`.
    pub fn new(gold_price: Arc<dyn GoldPriceFeed>, sink: Arc<dyn EstimationSink>) -> Self {
        Self {
            analyzer: None,
            valuation: ValuationService::new(),
            validator: Err("reflective validator is not configured".to_string()),
            gold_price,
            sink,
        }
    }

    pub fn with_analyzer(mut self, analyzer: ImageAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_validator(mut self, validator: ReflectiveValidator) -> Self {
        self.validator = Ok(validator);
        self
    }

    pub fn without_validator(mut self, reason: impl Into<String>) -> Self {
        self.validator = Err(reason.into());
        self
    }

    /// Wire one completion capability into both the analyzer and the validator,
    /// with the built-in knowledge base behind retrieval.
    pub fn with_capability(
        self,
        completion: Arc<dyn CompletionCapability>,
        analysis_timeout: Duration,
        capability_timeout: Duration,
    ) -> Self {
        let validator = ReflectiveValidator::new(
            Arc::new(InMemoryKnowledgeBase::default()),
            completion.clone(),
            capability_timeout,
        );
        self.with_analyzer(ImageAnalyzer::new(completion, analysis_timeout))
            .with_validator(validator)
    }

    /// Gemini-backed pipeline. A missing API key leaves analysis and
    /// validation unavailable instead of failing startup.
    pub fn from_config(config: &AppConfig, sink: Arc<dyn EstimationSink>) -> Self {
        let feed = Arc::new(FixedGoldPriceFeed::new(config.pricing.gold_price_per_gram));
        let pipeline = Self::new(feed, sink);

        match GeminiClient::new(
            config.gemini.api_key.clone(),
            &config.gemini.model,
            config.timeouts.analysis,
        ) {
            Ok(client) => {
                info!(model = client.model(), "Gemini capability configured");
                pipeline.with_capability(
                    Arc::new(client),
                    config.timeouts.analysis,
                    config.timeouts.capability,
                )
            }
            Err(e) => {
                warn!(error = %e, "Gemini capability unavailable; image analysis and validation disabled");
                let reason = match e {
                    ValuationError::Config(reason) => reason,
                    other => other.to_string(),
                };
                pipeline.without_validator(ValuationError::ValidationUnavailable(reason).to_string())
            }
        }
    }

    pub fn validation_available(&self) -> bool {
        self.validator.is_ok()
    }

    pub async fn gold_price(&self) -> Result<GoldPrice> {
        self.gold_price.current().await
    }

    pub async fn analyze_image(&self, image: EncodedImage) -> Result<AnalysisOutcome> {
        match &self.analyzer {
            Some(analyzer) => analyzer.analyze(image).await,
            None => Err(ValuationError::AnalysisFailed(
                "image analysis capability is not configured".to_string(),
            )),
        }
    }

    /// Price a client-submitted analysis.
    pub async fn estimate(
        &self,
        input: AnalysisInput,
        include_validation: bool,
        user_id: Uuid,
    ) -> Result<EstimationResponse> {
        let analysis = input.into_analysis()?;
        self.estimate_analysis(&analysis, include_validation, user_id)
            .await
    }

    pub async fn estimate_analysis(
        &self,
        analysis: &JewelryAnalysis,
        include_validation: bool,
        user_id: Uuid,
    ) -> Result<EstimationResponse> {
        let price = self.gold_price.current().await?;
        let estimation = self.valuation.estimate(analysis, price.price_per_gram)?;

        let (verdict, validation_error) = if include_validation {
            match &self.validator {
                Ok(validator) => (Some(validator.validate(&estimation).await), None),
                Err(reason) => {
                    warn!(
                        estimation_id = %estimation.estimation_id,
                        reason = %reason,
                        "Validation requested but unavailable"
                    );
                    (None, Some(reason.clone()))
                }
            }
        } else {
            (None, None)
        };

        // single hand-off, after every stage has finished
        self.sink
            .commit(EstimationRecord::new(estimation.clone(), verdict.clone(), user_id))
            .await?;

        info!(
            estimation_id = %estimation.estimation_id,
            %user_id,
            validated = verdict.is_some(),
            "Estimation committed"
        );

        Ok(EstimationResponse {
            success: true,
            estimation,
            rag_validation: verdict,
            rag_validation_error: validation_error,
        })
    }

    pub async fn find(&self, estimation_id: &str) -> Result<Option<EstimationRecord>> {
        self.sink.load(estimation_id).await
    }
}
