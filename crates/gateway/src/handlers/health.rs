//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub providers: ProviderStatus,
    pub active_streams: usize,
}

#[derive(Serialize)]
pub struct ProviderStatus {
    /// Text generators in fallback order
    pub llm: Vec<String>,
    pub web_search: bool,
    pub notes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker: Option<String>,
    pub vision: bool,
}

/// Liveness plus a summary of configured providers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers = &state.providers;

    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.config.observability.service_name.clone(),
        version: rag_common::VERSION.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        providers: ProviderStatus {
            llm: providers.llm.provider_names().into_iter().map(str::to_string).collect(),
            web_search: providers.web.is_some(),
            notes: providers.notes.is_some(),
            reranker: providers.scorer.as_ref().map(|s| s.name().to_string()),
            vision: providers.vision.is_some(),
        },
        active_streams: state.registry.active_count(),
    })
}
