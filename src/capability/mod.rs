//! Capability traits for the external AI services
//!
//! The pipeline never talks to a vendor SDK directly. Image analysis and the
//! text stages of the validator go through `CompletionCapability`; regulation
//! lookup goes through `RetrievalCapability`. Both are injected at construction.

use crate::error::ValuationError;
use crate::knowledge::{RegulationEntry, RetrievalQuery};
use crate::models::EncodedImage;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Which pipeline step issued a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionPurpose {
    ImageAnalysis,
    Generation,
    Reflection,
    Validation,
}

impl CompletionPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionPurpose::ImageAnalysis => "image_analysis",
            CompletionPurpose::Generation => "generation",
            CompletionPurpose::Reflection => "reflection",
            CompletionPurpose::Validation => "validation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: CompletionPurpose,
    pub system: Option<String>,
    pub prompt: String,
    pub image: Option<EncodedImage>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    pub fn text(purpose: CompletionPurpose, prompt: String) -> Self {
        Self {
            purpose,
            system: None,
            prompt,
            image: None,
            temperature: 0.2,
            max_output_tokens: 1024,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: EncodedImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Provider-side confidence in [0, 1].
    pub confidence: f32,
}

/// Text-in/text-out generation, optionally with one image attached.
#[async_trait]
pub trait CompletionCapability: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Search over the regulatory knowledge base.
#[async_trait]
pub trait RetrievalCapability: Send + Sync {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RegulationEntry>>;
}

/// Run a completion under an upper time bound; elapsed calls become
/// `CapabilityTimeout`.
pub async fn complete_within(
    capability: &dyn CompletionCapability,
    request: &CompletionRequest,
    limit: Duration,
) -> Result<Completion> {
    match tokio::time::timeout(limit, capability.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(ValuationError::CapabilityTimeout(limit)),
    }
}

pub async fn search_within(
    capability: &dyn RetrievalCapability,
    query: &RetrievalQuery,
    limit: Duration,
) -> Result<Vec<RegulationEntry>> {
    match tokio::time::timeout(limit, capability.search(query)).await {
        Ok(result) => result,
        Err(_) => Err(ValuationError::CapabilityTimeout(limit)),
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<Completion> + Send + Sync;

/// Mock capability for offline runs and tests.
/// Keeps the pipeline functional without a vendor dependency.
#[derive(Clone)]
pub struct MockCompletion {
    responder: Arc<Responder>,
}

impl MockCompletion {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<Completion> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
        }
    }

    /// Always answers with the same text.
    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::from_fn(move |_| {
            Ok(Completion {
                text: text.clone(),
                confidence: 0.9,
            })
        })
    }

    /// Always fails as if the provider were unreachable.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::from_fn(move |_| Err(ValuationError::Capability(message.clone())))
    }

    /// Plausible canned answers for every purpose.
    pub fn appraiser() -> Self {
        Self::from_fn(|request| {
            let text = match request.purpose {
                CompletionPurpose::ImageAnalysis => r#"```json
{
  "objectType": "Kalung",
  "estimatedWeight": 12.5,
  "karat": 22,
  "condition": "Baik",
  "confidence": {
    "objectDetection": 92,
    "weightEstimation": 84,
    "karatAnalysis": 86,
    "conditionAnalysis": 90
  },
  "analysis": "Yellow-orange chain necklace with consistent links and light surface wear."
}
```"#
                .to_string(),
                CompletionPurpose::Generation => "The item meets the minimum weight rule and \
                    the loan stays within the LTV ceiling for its purity. Condition is \
                    eligible. Risk is low."
                    .to_string(),
                CompletionPurpose::Reflection => "NONE".to_string(),
                CompletionPurpose::Validation => "APPROVED".to_string(),
            };

            Ok(Completion {
                text,
                confidence: 0.9,
            })
        })
    }
}

#[async_trait]
impl CompletionCapability for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        (self.responder)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledCompletion;

    #[async_trait]
    impl CompletionCapability for StalledCompletion {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Completion {
                text: "late".to_string(),
                confidence: 1.0,
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_capability_timeout() {
        let request = CompletionRequest::text(CompletionPurpose::Generation, "hi".to_string());
        let result =
            complete_within(&StalledCompletion, &request, Duration::from_millis(20)).await;

        assert!(matches!(result, Err(ValuationError::CapabilityTimeout(_))));
    }

    #[tokio::test]
    async fn test_appraiser_answers_by_purpose() {
        let mock = MockCompletion::appraiser();
        let request = CompletionRequest::text(CompletionPurpose::Validation, String::new());
        let completion = mock.complete(&request).await.unwrap();
        assert_eq!(completion.text, "APPROVED");
    }
}
