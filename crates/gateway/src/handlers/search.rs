//! Research search handlers

use axum::{extract::State, Json};
use rag_agent::{ResearchRequest, ResearchResponse};
use rag_common::config::AppConfig;
use rag_common::errors::{AppError, Result};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::AppState;

/// Search request, shared by the streaming and synchronous endpoints
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_true")]
    pub include_private_notes: bool,

    /// Defaults to `agent.default_max_hops`
    #[serde(default)]
    pub max_hops: Option<usize>,

    #[serde(default = "default_true")]
    pub include_vision: bool,
}

fn default_true() -> bool { true }

impl SearchRequest {
    /// Validate and convert into a research run
    pub fn into_research(self, config: &AppConfig) -> Result<ResearchRequest> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        if self.query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "query must not be blank".to_string(),
                field: Some("query".to_string()),
            });
        }

        let cap = config.agent.max_hops_cap.max(1);
        if let Some(hops) = self.max_hops {
            if hops == 0 || hops > cap {
                return Err(AppError::Validation {
                    message: format!("max_hops must be between 1 and {}", cap),
                    field: Some("max_hops".to_string()),
                });
            }
        }

        Ok(ResearchRequest {
            query: self.query,
            user_id: self.user_id.filter(|u| !u.trim().is_empty()),
            include_notes: self.include_private_notes,
            include_vision: self.include_vision,
            hop_limit: config.hop_limit(self.max_hops),
        })
    }
}

/// Run a research session to completion and return the result
pub async fn search_sync(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ResearchResponse>> {
    let start = Instant::now();
    let request = request.into_research(&state.config)?;

    let session = state.control.run(&request).await?;

    tracing::info!(
        query = %request.query,
        hop_limit = request.hop_limit,
        iterations = session.hop_count,
        sources = session.results.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Synchronous research completed"
    );

    Ok(Json(session.to_response()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> SearchRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_defaults_apply() {
        let config = AppConfig::default();
        let research = request(serde_json::json!({"query": "entropy"}))
            .into_research(&config)
            .unwrap();

        assert_eq!(research.hop_limit, config.agent.default_max_hops);
        assert!(research.include_notes);
        assert!(research.include_vision);
        assert!(research.user_id.is_none());
    }

    #[test]
    fn test_hop_bounds_are_validated() {
        let config = AppConfig::default();
        assert!(request(serde_json::json!({"query": "q", "max_hops": 0})).into_research(&config).is_err());
        assert!(request(serde_json::json!({"query": "q", "max_hops": 11})).into_research(&config).is_err());
        assert_eq!(
            request(serde_json::json!({"query": "q", "max_hops": 10})).into_research(&config).unwrap().hop_limit,
            10
        );
    }

    #[test]
    fn test_query_length_is_validated() {
        let config = AppConfig::default();
        assert!(request(serde_json::json!({"query": ""})).into_research(&config).is_err());
        assert!(request(serde_json::json!({"query": "   "})).into_research(&config).is_err());
        assert!(request(serde_json::json!({"query": "x".repeat(2001)})).into_research(&config).is_err());
    }
}
