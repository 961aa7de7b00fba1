//! The research control loop
//!
//! search -> rerank -> decide, repeated while the session wants more evidence
//! and the hop budget allows, then optional image analysis and synthesis.
//! The same loop serves the synchronous and the streaming paths; the
//! streaming path just observes it through a [`PhaseObserver`].

use crate::decision::DecisionPolicy;
use crate::events::StreamEvent;
use crate::session::Session;
use crate::synthesizer::AnswerSynthesizer;
use async_trait::async_trait;
use rag_common::config::AppConfig;
use rag_common::errors::{AppError, Result};
use rag_common::metrics;
use rag_common::models::{DomainMode, ExtractDomain, SearchDepth, SourceTag};
use rag_common::providers::{ImageAnalyzer, Providers};
use rag_search::{RerankEngine, SearchAggregator, SearchRequest};
use std::sync::Arc;
use std::time::Instant;

/// Receives every phase transition in order. An error stops the run.
#[async_trait]
pub trait PhaseObserver: Send + Sync {
    async fn emit(&self, event: StreamEvent) -> Result<()>;
}

/// Observer for the synchronous path
pub struct NoopObserver;

#[async_trait]
impl PhaseObserver for NoopObserver {
    async fn emit(&self, _event: StreamEvent) -> Result<()> {
        Ok(())
    }
}

/// One research run
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    pub user_id: Option<String>,
    pub include_notes: bool,
    pub include_vision: bool,
    pub hop_limit: usize,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, hop_limit: usize) -> Self {
        Self {
            query: query.into(),
            user_id: None,
            include_notes: true,
            include_vision: true,
            hop_limit,
        }
    }
}

pub struct ControlLoop {
    aggregator: SearchAggregator,
    reranker: RerankEngine,
    policy: DecisionPolicy,
    synthesizer: AnswerSynthesizer,
    vision: Option<Arc<dyn ImageAnalyzer>>,
    vision_domain: ExtractDomain,
    max_results: usize,
    top_k: usize,
    max_images: usize,
}

impl ControlLoop {
    pub fn new(
        aggregator: SearchAggregator,
        reranker: RerankEngine,
        policy: DecisionPolicy,
        synthesizer: AnswerSynthesizer,
        vision: Option<Arc<dyn ImageAnalyzer>>,
    ) -> Self {
        Self {
            aggregator,
            reranker,
            policy,
            synthesizer,
            vision,
            vision_domain: ExtractDomain::Physics,
            max_results: 10,
            top_k: rag_search::rerank::DEFAULT_TOP_K,
            max_images: 3,
        }
    }

    /// Wire the loop from configured providers
    pub fn from_config(providers: &Providers, config: &AppConfig) -> Self {
        let depth = config.search.depth.parse::<SearchDepth>().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid search.depth, using default");
            SearchDepth::default()
        });
        let mode = config.search.domain_mode.parse::<DomainMode>().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid search.domain_mode, using default");
            DomainMode::default()
        });

        let aggregator = SearchAggregator::new(providers.web.clone(), providers.notes.clone())
            .with_depth(depth)
            .with_domain_mode(mode);
        let reranker = RerankEngine::new(providers.scorer.clone(), config.rerank.max_concurrency)
            .with_max_text_chars(config.rerank.max_text_chars);
        let policy = DecisionPolicy::new(providers.llm.clone())
            .with_evidence_threshold(config.agent.evidence_threshold);
        let synthesizer = AnswerSynthesizer::new(providers.llm.clone());

        let mut control = Self::new(aggregator, reranker, policy, synthesizer, providers.vision.clone());
        control.max_results = config.search.max_results;
        control.top_k = config.rerank.top_k;
        control.max_images = config.vision.max_images;
        control
    }

    /// Run without observing phases
    pub async fn run(&self, request: &ResearchRequest) -> Result<Session> {
        self.run_observed(request, &NoopObserver).await
    }

    /// Run, reporting each phase to `observer`
    pub async fn run_observed(&self, request: &ResearchRequest, observer: &dyn PhaseObserver) -> Result<Session> {
        let start = Instant::now();
        let result = self.execute(request, observer).await;

        let (outcome, hops) = match &result {
            Ok(session) => ("completed", session.hop_count),
            Err(AppError::Cancelled) => ("cancelled", 0),
            Err(_) => ("failed", 0),
        };
        metrics::record_session(outcome, hops, start.elapsed().as_secs_f64());

        match &result {
            Ok(session) => tracing::info!(
                query = %session.original_query(),
                hops = session.hop_count,
                sources = session.results.len(),
                vision = session.vision_findings.is_some(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Research session completed"
            ),
            Err(AppError::Cancelled) => tracing::info!("Research session cancelled by consumer"),
            Err(e) => tracing::error!(error = %e, "Research session failed"),
        }

        result
    }

    async fn execute(&self, request: &ResearchRequest, observer: &dyn PhaseObserver) -> Result<Session> {
        let mut session = Session::new(&request.query, request.hop_limit)?;

        observer.emit(StreamEvent::thinking("Analyzing your query...", None)).await?;

        while session.should_search() {
            self.hop(&mut session, request, observer).await?;
        }

        if request.include_vision {
            self.analyze_images(&mut session, observer).await?;
        }

        observer
            .emit(StreamEvent::Generating { message: "Synthesizing final answer...".to_string() })
            .await?;

        self.synthesizer.synthesize(&mut session).await;

        observer.emit(StreamEvent::Result(session.to_response())).await?;
        Ok(session)
    }

    async fn hop(&self, session: &mut Session, request: &ResearchRequest, observer: &dyn PhaseObserver) -> Result<()> {
        let iteration = session.hop_count + 1;
        let query = session.working_query().to_string();

        let search_request = SearchRequest {
            query: &query,
            user_id: request.user_id.as_deref(),
            include_notes: request.include_notes,
            max_results: self.max_results,
        };

        observer
            .emit(StreamEvent::Searching {
                iteration,
                query: query.clone(),
                source: SourceTag::Web,
                message: format!("Searching the web for: {}", query),
            })
            .await?;

        if search_request.wants_notes() {
            observer
                .emit(StreamEvent::Searching {
                    iteration,
                    query: query.clone(),
                    source: SourceTag::Notes,
                    message: "Searching your private notes...".to_string(),
                })
                .await?;
        }

        let aggregated = self.aggregator.search(&search_request).await;

        observer
            .emit(StreamEvent::Results { iteration, count: aggregated.web_count, source: SourceTag::Web })
            .await?;
        if let Some(count) = aggregated.notes_count {
            observer
                .emit(StreamEvent::Results { iteration, count, source: SourceTag::Notes })
                .await?;
        }

        let combined = session.combine(aggregated.items);
        if combined.is_empty() {
            session.results = combined;
        } else {
            observer
                .emit(StreamEvent::Reranking {
                    count: combined.len(),
                    message: "Applying cross-encoder reranking...".to_string(),
                })
                .await?;
            session.results = self.reranker.rerank(&query, combined, self.top_k).await;
        }

        observer
            .emit(StreamEvent::thinking("Evaluating result quality...", Some(iteration)))
            .await?;

        let state = self.policy.decide(session).await;
        tracing::debug!(iteration, ?state, results = session.results.len(), "Hop decided");

        if session.should_search() {
            observer
                .emit(StreamEvent::Refining {
                    iteration,
                    reason: session.last_trace().unwrap_or("Need more specific results").to_string(),
                    new_query: session.working_query().to_string(),
                    message: format!("Refining search query to: {}", session.working_query()),
                })
                .await?;
        }

        Ok(())
    }

    /// Analyze up to `max_images` result images, keeping the first non-empty
    /// analysis
    async fn analyze_images(&self, session: &mut Session, observer: &dyn PhaseObserver) -> Result<()> {
        let Some(vision) = self.vision.as_ref() else {
            return Ok(());
        };

        let images: Vec<String> = session
            .results
            .iter()
            .filter_map(|r| r.image_url.as_deref())
            .filter(|u| !u.trim().is_empty())
            .map(str::to_string)
            .collect();

        if images.is_empty() {
            return Ok(());
        }

        observer
            .emit(StreamEvent::Vision {
                message: "Analyzing diagrams...".to_string(),
                count: images.len(),
            })
            .await?;

        for image_url in images.into_iter().take(self.max_images) {
            match vision.analyze(&image_url, Some(session.original_query()), self.vision_domain).await {
                Ok(analysis) if !analysis.is_empty() => {
                    observer
                        .emit(StreamEvent::VisionResult { image_url, analysis: analysis.clone() })
                        .await?;
                    session.vision_findings = Some(analysis);
                    break;
                }
                Ok(_) => tracing::debug!(image_url, "Image analysis was empty"),
                Err(e) => tracing::warn!(image_url, error = %e, "Image analysis failed"),
            }
        }

        Ok(())
    }
}
