//! REST API server for the valuation pipeline
//!
//! Exposes image analysis, estimation, record lookup and status tracking over HTTP.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::error::ValuationError;
use crate::models::{EncodedImage, EstimationStatus};
use crate::pipeline::{AnalysisResponse, EstimationResponse, ValuationPipeline};
use crate::tracking::TrackingProjector;
use crate::valuation::AnalysisInput;

pub const USER_ID_HEADER: &str = "x-user-id";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRequest {
    #[serde(default)]
    pub analysis_data: Option<AnalysisInput>,
    #[serde(default)]
    pub include_rag_validation: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimelineRequest {
    pub status: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiFailure = (StatusCode, Json<ApiResponse>);

fn failure(status: StatusCode, message: impl Into<String>) -> ApiFailure {
    (status, Json(ApiResponse::error(message.into())))
}

fn pipeline_failure(e: ValuationError) -> ApiFailure {
    if e.is_client_error() {
        warn!(error = %e, "Rejected request");
        failure(StatusCode::BAD_REQUEST, e.to_string())
    } else {
        error!(error = %e, "Request failed");
        failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

fn bad_json(rejection: JsonRejection) -> ApiFailure {
    failure(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", rejection.body_text()))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<ValuationPipeline>,
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v.trim()).unwrap_or_else(|_| stable_uuid_from_string(v.trim()))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

fn user_id_from(headers: &HeaderMap) -> uuid::Uuid {
    let value = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    parse_or_stable_uuid(value, "anonymous-user")
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "validationAvailable": state.pipeline.validation_available(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Estimation Endpoints
/// =============================

async fn create_estimation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<EstimationRequest>, JsonRejection>,
) -> Result<Json<EstimationResponse>, ApiFailure> {
    let Json(req) = body.map_err(bad_json)?;
    let user_id = user_id_from(&headers);

    let Some(input) = req.analysis_data else {
        return Err(failure(StatusCode::BAD_REQUEST, "analysisData is required"));
    };

    info!(%user_id, include_rag = req.include_rag_validation, "Received estimation request");

    state
        .pipeline
        .estimate(input, req.include_rag_validation, user_id)
        .await
        .map(Json)
        .map_err(pipeline_failure)
}

async fn get_estimation(
    State(state): State<ApiState>,
    Path(estimation_id): Path<String>,
) -> Result<Json<ApiResponse>, ApiFailure> {
    match state.pipeline.find(&estimation_id).await {
        Ok(Some(record)) => Ok(Json(ApiResponse::success(record))),
        Ok(None) => Err(failure(
            StatusCode::NOT_FOUND,
            format!("Estimation {} not found", estimation_id),
        )),
        Err(e) => Err(pipeline_failure(e)),
    }
}

/// =============================
/// Image Analysis Endpoint
/// =============================

async fn analyze_image(
    State(state): State<ApiState>,
    body: Result<Json<ImageAnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiFailure> {
    let Json(req) = body.map_err(bad_json)?;

    let image = match req.image_base64.as_deref().map(str::trim) {
        Some(data) if !data.is_empty() => EncodedImage::parse(data).map_err(pipeline_failure)?,
        _ => return Err(failure(StatusCode::BAD_REQUEST, "imageBase64 is required")),
    };

    info!(mime_type = %image.mime_type, "Received image analysis request");

    state
        .pipeline
        .analyze_image(image)
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(pipeline_failure)
}

/// =============================
/// Reference Endpoints
/// =============================

async fn gold_price(State(state): State<ApiState>) -> Result<Json<ApiResponse>, ApiFailure> {
    state
        .pipeline
        .gold_price()
        .await
        .map(|price| Json(ApiResponse::success(price)))
        .map_err(pipeline_failure)
}

async fn tracking_timeline(
    body: Result<Json<TimelineRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiFailure> {
    let Json(req) = body.map_err(bad_json)?;

    let Some(status) = EstimationStatus::parse(&req.status) else {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            format!("Unknown status: {}", req.status),
        ));
    };

    Ok(Json(ApiResponse::success(serde_json::json!({
        "status": status,
        "progress": TrackingProjector::progress(status),
        "timeline": TrackingProjector::timeline(status),
    }))))
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<ValuationPipeline>) -> Router {
    let state = ApiState { pipeline };

    Router::new()
        .route("/health", get(health))
        .route("/api/estimation", post(create_estimation))
        .route("/api/estimation/:id", get(get_estimation))
        .route("/api/analyze-gemini", post(analyze_image))
        .route("/api/gold-price", get(gold_price))
        .route("/api/tracking/timeline", post(tracking_timeline))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<ValuationPipeline>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
