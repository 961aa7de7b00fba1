//! External collaborators consumed by the research loop
//!
//! Every collaborator sits behind a narrow trait so the control loop never
//! knows which vendor answers:
//! - Text generation (OpenAI-compatible chat, Gemini) behind a fallback chain
//! - Web search (Tavily) with domain allow-lists
//! - Private notes search (stub)
//! - Pairwise relevance scoring (cross-encoder service, lexical overlap)
//! - Image analysis (Gemini vision)

mod llm;
mod notes;
mod scoring;
mod vision;
mod web;

pub use llm::{FallbackChain, GeminiClient, OpenAiCompatibleClient, UNAVAILABLE_RESPONSE};
pub use notes::StubNotesSearch;
pub use scoring::{HttpCrossEncoder, LexicalScorer};
pub use vision::{parse_vision_response, GeminiVision};
pub use web::{TavilySearch, ACADEMIC_DOMAINS, CONSTANTS_DOMAINS};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::models::{DomainMode, ExtractDomain, ResultItem, SearchDepth, VisionAnalysis};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Text generation: `(prompt, system) -> text`
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, system: &str) -> Result<String>;

    /// Provider name for logs and metrics
    fn name(&self) -> &str;
}

/// Web search provider
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: SearchDepth,
        mode: DomainMode,
    ) -> Result<Vec<ResultItem>>;
}

/// Private notes provider
#[async_trait]
pub trait NotesSearch: Send + Sync {
    async fn search_notes(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<ResultItem>>;
}

/// Pairwise (query, text) relevance scoring
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, query: &str, text: &str) -> Result<f32>;

    /// Score many texts against one query; one score per text, in order
    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());
        for text in texts {
            scores.push(self.score(query, text).await?);
        }
        Ok(scores)
    }

    fn name(&self) -> &str;
}

/// Diagram / image analysis
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image_url: &str,
        context: Option<&str>,
        domain: ExtractDomain,
    ) -> Result<VisionAnalysis>;
}

/// Collaborators assembled from configuration
#[derive(Clone)]
pub struct Providers {
    pub llm: Arc<FallbackChain>,
    pub web: Option<Arc<dyn WebSearch>>,
    pub notes: Option<Arc<dyn NotesSearch>>,
    pub scorer: Option<Arc<dyn RelevanceScorer>>,
    pub vision: Option<Arc<dyn ImageAnalyzer>>,
}

impl Providers {
    /// Build every configured collaborator; unconfigured ones are left out
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut generators: Vec<Arc<dyn TextGenerator>> = Vec::new();

        if let Some(key) = config.llm.groq_api_key.clone() {
            generators.push(Arc::new(OpenAiCompatibleClient::new(
                "groq",
                config.llm.groq_endpoint.clone(),
                key,
                config.llm.groq_model.clone(),
                config.llm.temperature,
                config.llm.max_tokens,
                Duration::from_secs(config.llm.timeout_secs),
            )?));
        }

        if let Some(key) = config.llm.gemini_api_key.clone() {
            generators.push(Arc::new(GeminiClient::new(
                config.llm.gemini_base_url.clone(),
                key,
                config.llm.gemini_model.clone(),
                config.llm.temperature,
                Duration::from_secs(config.llm.timeout_secs),
            )?));
        }

        if generators.is_empty() {
            tracing::warn!("No text-generation provider configured; answers will be unavailable");
        }

        let web: Option<Arc<dyn WebSearch>> = match config.search.tavily_api_key.clone() {
            Some(key) => Some(Arc::new(TavilySearch::new(
                config.search.tavily_endpoint.clone(),
                key,
                Duration::from_secs(config.search.timeout_secs),
            )?)),
            None => {
                tracing::warn!("TAVILY_API_KEY not set - web search will be disabled");
                None
            }
        };

        let notes: Option<Arc<dyn NotesSearch>> =
            Some(Arc::new(StubNotesSearch::new(config.search.notes_service_url.clone())));

        let scorer: Option<Arc<dyn RelevanceScorer>> = match config.rerank.provider.as_str() {
            "http" => match config.rerank.endpoint.clone() {
                Some(endpoint) => Some(Arc::new(HttpCrossEncoder::new(
                    endpoint,
                    Duration::from_secs(config.rerank.timeout_secs),
                )?)),
                None => {
                    tracing::warn!("rerank.provider = http but no endpoint set; reranking disabled");
                    None
                }
            },
            "lexical" => Some(Arc::new(LexicalScorer::new())),
            "none" => None,
            other => {
                tracing::warn!(provider = other, "Unknown rerank provider, reranking disabled");
                None
            }
        };

        let vision: Option<Arc<dyn ImageAnalyzer>> =
            match (config.vision.enabled, config.llm.gemini_api_key.clone()) {
                (true, Some(key)) => Some(Arc::new(GeminiVision::new(
                    config.llm.gemini_base_url.clone(),
                    key,
                    config.llm.gemini_model.clone(),
                    Duration::from_secs(config.vision.fetch_timeout_secs),
                    Duration::from_secs(config.llm.timeout_secs),
                )?)),
                (true, None) => {
                    tracing::warn!("GEMINI_API_KEY not set - vision analysis will be disabled");
                    None
                }
                (false, _) => None,
            };

        Ok(Self {
            llm: Arc::new(FallbackChain::new(generators)),
            web,
            notes,
            scorer,
            vision,
        })
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| crate::errors::AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}
