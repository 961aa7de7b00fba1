//! Diagram analysis handler

use axum::{extract::State, Json};
use rag_common::errors::{AppError, Result};
use rag_common::models::{ExtractDomain, VisionAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct VisionRequest {
    #[validate(url)]
    pub image_url: String,

    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub extract_for: ExtractDomain,
}

#[derive(Debug, Serialize)]
pub struct VisionResponse {
    pub success: bool,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<VisionAnalysis>,
    /// Extracted variables, ready for the labs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_data: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Analyze one image. Provider failures are reported in the body with
/// `success: false`; only invalid requests produce an error status.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<VisionRequest>,
) -> Result<Json<VisionResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("image_url".to_string()),
    })?;

    let outcome = match state.providers.vision.as_ref() {
        Some(vision) => {
            vision
                .analyze(&request.image_url, request.context.as_deref(), request.extract_for)
                .await
        }
        None => Err(AppError::unavailable("gemini-vision")),
    };

    let response = match outcome {
        Ok(analysis) => {
            tracing::info!(
                image_url = %request.image_url,
                domain = %request.extract_for,
                variables = analysis.extracted_variables.len(),
                "Image analyzed"
            );
            VisionResponse {
                success: true,
                image_url: request.image_url,
                lab_data: Some(analysis.extracted_variables.clone()),
                analysis: Some(analysis),
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(image_url = %request.image_url, error = %e, "Image analysis failed");
            VisionResponse {
                success: false,
                image_url: request.image_url,
                analysis: None,
                lab_data: None,
                error: Some(e.to_string()),
            }
        }
    };

    Ok(Json(response))
}
