//! Gemini API client
//!
//! Implements `CompletionCapability` for text prompts and for prompts with one
//! inline image. Uses a long-lived reqwest::Client for connection pooling.

use crate::capability::{Completion, CompletionCapability, CompletionRequest};
use crate::error::ValuationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    /// Fails when the key is missing or the HTTP client cannot be built.
    pub fn new(api_key: String, model: &str, request_timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ValuationError::Config(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(request: &CompletionRequest) -> GeminiRequest {
        let mut parts = Vec::with_capacity(2);

        if let Some(image) = &request.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            });
        }
        parts.push(Part::Text {
            text: request.prompt.clone(),
        });

        GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: request.max_output_tokens,
            },
            system_instruction: request.system.as_ref().map(|text| SystemInstruction {
                parts: vec![Part::Text { text: text.clone() }],
            }),
        }
    }
}

#[async_trait]
impl CompletionCapability for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let body = Self::build_request(request);

        info!(
            purpose = request.purpose.as_str(),
            model = %self.model,
            with_image = request.image.is_some(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                ValuationError::Capability(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(ValuationError::Capability(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            ValuationError::Capability(format!("Gemini parse error: {}", e))
        })?;

        let candidate = gemini_response
            .candidates
            .first()
            .ok_or_else(|| ValuationError::Capability("No response from Gemini API".to_string()))?;

        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ValuationError::Capability(
                "Empty response from Gemini".to_string(),
            ));
        }

        let confidence = calculate_confidence(candidate.finish_reason.as_deref(), text.len());

        info!(
            purpose = request.purpose.as_str(),
            confidence,
            "Gemini response received"
        );

        Ok(Completion { text, confidence })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

/// Calculate response confidence
fn calculate_confidence(finish_reason: Option<&str>, response_length: usize) -> f32 {
    let base_confidence: f32 = 0.85;

    let finish_confidence = match finish_reason {
        Some("STOP") => 1.0,
        Some("MAX_TOKENS") => 0.8,
        Some("SAFETY") => 0.6,
        _ => 0.7,
    };

    // single-token verdicts are expected to be short
    let length_confidence = if response_length == 0 {
        0.6
    } else if response_length > 4000 {
        0.8
    } else {
        1.0
    };

    (base_confidence * finish_confidence * length_confidence).clamp(0.5, 0.98)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CompletionPurpose;
    use crate::models::EncodedImage;

    #[test]
    fn test_request_serialization_with_image() {
        let request = CompletionRequest::text(
            CompletionPurpose::ImageAnalysis,
            "Appraise this item".to_string(),
        )
        .with_system("You are a gold appraiser")
        .with_image(EncodedImage::from_bytes("image/png", b"png-bytes"));

        let json = serde_json::to_value(GeminiClient::build_request(&request)).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["text"], "Appraise this item");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "You are a gold appraiser");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_response_parsing() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "APPROVED" }], "role": "model" },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 10 }
        });

        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_confidence_bounds() {
        assert!((calculate_confidence(Some("STOP"), 120) - 0.85).abs() < f32::EPSILON);
        assert_eq!(calculate_confidence(Some("SAFETY"), 0), 0.5);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let result = GeminiClient::new(String::new(), "gemini-2.0-flash", Duration::from_secs(5));
        assert!(matches!(result, Err(ValuationError::Config(_))));
    }
}
