//! Concurrent fan-out over the evidence providers
//!
//! Web search and private notes run in parallel and are joined before fusion.
//! A provider that fails or is not configured contributes an empty list.

use crate::fusion::FusionEngine;
use rag_common::errors::{AppError, Result};
use rag_common::metrics;
use rag_common::models::{DomainMode, ResultItem, SearchDepth};
use rag_common::providers::{NotesSearch, WebSearch};
use std::sync::Arc;
use std::time::Instant;

/// One aggregation call
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub user_id: Option<&'a str>,
    pub include_notes: bool,
    /// Cap per source
    pub max_results: usize,
}

impl SearchRequest<'_> {
    /// Notes are searched only when enabled and a user is known
    pub fn wants_notes(&self) -> bool {
        self.include_notes && self.user_id.map_or(false, |u| !u.trim().is_empty())
    }
}

/// Joined output of one hop's searches
#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    pub items: Vec<ResultItem>,
    pub web_count: usize,
    /// `None` when notes were not searched
    pub notes_count: Option<usize>,
}

#[derive(Clone)]
pub struct SearchAggregator {
    web: Option<Arc<dyn WebSearch>>,
    notes: Option<Arc<dyn NotesSearch>>,
    fusion: FusionEngine,
    depth: SearchDepth,
    mode: DomainMode,
}

impl SearchAggregator {
    pub fn new(web: Option<Arc<dyn WebSearch>>, notes: Option<Arc<dyn NotesSearch>>) -> Self {
        Self {
            web,
            notes,
            fusion: FusionEngine::default(),
            depth: SearchDepth::default(),
            mode: DomainMode::default(),
        }
    }

    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_domain_mode(mut self, mode: DomainMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn search(&self, request: &SearchRequest<'_>) -> Aggregated {
        let start = Instant::now();
        let wants_notes = request.wants_notes();

        let (web, notes) = tokio::join!(
            self.search_web(request),
            async {
                if wants_notes {
                    Some(self.search_notes(request).await)
                } else {
                    None
                }
            }
        );

        let web_count = web.len();
        let notes_count = notes.as_ref().map(Vec::len);

        let items = match notes {
            Some(notes) if !web.is_empty() && !notes.is_empty() => self.fusion.fuse(vec![web, notes]),
            Some(notes) if web.is_empty() => notes,
            _ => web,
        };

        let sources = 1 + usize::from(wants_notes);
        metrics::record_search(start.elapsed().as_secs_f64(), sources, items.len());
        tracing::debug!(
            query = request.query,
            web = web_count,
            notes = ?notes_count,
            total = items.len(),
            "Search aggregated"
        );

        Aggregated { items, web_count, notes_count }
    }

    async fn search_web(&self, request: &SearchRequest<'_>) -> Vec<ResultItem> {
        let Some(web) = self.web.as_ref() else {
            return Vec::new();
        };

        let start = Instant::now();
        let result = web.search(request.query, request.max_results, self.depth, self.mode).await;
        degrade("web", start, result)
    }

    async fn search_notes(&self, request: &SearchRequest<'_>) -> Vec<ResultItem> {
        let (Some(notes), Some(user_id)) = (self.notes.as_ref(), request.user_id) else {
            return Vec::new();
        };

        let start = Instant::now();
        let result = notes.search_notes(request.query, user_id, request.max_results).await;
        degrade("notes", start, result)
    }
}

/// Partial results beat total failure: errors become an empty contribution
fn degrade(provider: &str, start: Instant, result: Result<Vec<ResultItem>>) -> Vec<ResultItem> {
    let elapsed = start.elapsed().as_secs_f64();
    match result {
        Ok(items) => {
            metrics::record_provider_call(provider, elapsed, true);
            items
        }
        Err(AppError::ProviderUnavailable { .. }) => {
            tracing::debug!(provider, "Provider not configured, contributing no results");
            Vec::new()
        }
        Err(e) => {
            metrics::record_provider_call(provider, elapsed, false);
            tracing::warn!(provider, error = %e, "Search provider failed, contributing no results");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_common::models::SourceTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedWeb {
        items: Vec<ResultItem>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl WebSearch for FixedWeb {
        async fn search(
            &self,
            _query: &str,
            max_results: usize,
            _depth: SearchDepth,
            _mode: DomainMode,
        ) -> Result<Vec<ResultItem>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AppError::provider("web", "timeout"));
            }
            Ok(self.items.iter().take(max_results).cloned().collect())
        }
    }

    struct FixedNotes {
        items: Vec<ResultItem>,
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl NotesSearch for FixedNotes {
        async fn search_notes(&self, _query: &str, _user_id: &str, _limit: usize) -> Result<Vec<ResultItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.items.clone())
        }
    }

    fn web_items(n: usize) -> Vec<ResultItem> {
        (0..n)
            .map(|i| ResultItem::new(format!("web {}", i), Some(format!("https://w/{}", i)), "c", 0.9, SourceTag::Web))
            .collect()
    }

    fn notes_items(urls: &[&str]) -> Vec<ResultItem> {
        urls.iter()
            .map(|u| ResultItem::new("note", Some(u.to_string()), "c", 0.7, SourceTag::Notes))
            .collect()
    }

    fn request<'a>(user_id: Option<&'a str>, include_notes: bool) -> SearchRequest<'a> {
        SearchRequest { query: "q", user_id, include_notes, max_results: 10 }
    }

    #[tokio::test]
    async fn test_single_source_keeps_raw_order() {
        let web = Arc::new(FixedWeb { items: web_items(3), fail: false, delay: Duration::ZERO });
        let aggregator = SearchAggregator::new(Some(web), None);

        let out = aggregator.search(&request(None, true)).await;
        assert_eq!(out.web_count, 3);
        assert_eq!(out.notes_count, None);
        assert_eq!(out.items[0].title, "web 0");
        assert_eq!(out.items[0].relevance_score, 0.9);
    }

    #[tokio::test]
    async fn test_notes_skipped_without_user() {
        let notes = Arc::new(FixedNotes { items: notes_items(&["https://n"]), calls: AtomicUsize::new(0), delay: Duration::ZERO });
        let aggregator = SearchAggregator::new(None, Some(notes.clone()));

        let out = aggregator.search(&request(None, true)).await;
        assert!(out.items.is_empty());
        assert_eq!(notes.calls.load(Ordering::SeqCst), 0);

        aggregator.search(&request(Some("u1"), false)).await;
        assert_eq!(notes.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_sources_are_fused() {
        let web = Arc::new(FixedWeb { items: web_items(2), fail: false, delay: Duration::ZERO });
        let notes = Arc::new(FixedNotes {
            items: notes_items(&["https://w/1", "https://n/9"]),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let aggregator = SearchAggregator::new(Some(web), Some(notes));

        let out = aggregator.search(&request(Some("u1"), true)).await;
        assert_eq!(out.web_count, 2);
        assert_eq!(out.notes_count, Some(2));
        assert_eq!(out.items.len(), 3);
        assert_eq!(out.items[0].url.as_deref(), Some("https://w/1"));
        assert_eq!(out.items[0].source_tag, SourceTag::Fused);
    }

    #[tokio::test]
    async fn test_failed_provider_contributes_nothing() {
        let web = Arc::new(FixedWeb { items: web_items(2), fail: true, delay: Duration::ZERO });
        let notes = Arc::new(FixedNotes { items: notes_items(&["https://n/1"]), calls: AtomicUsize::new(0), delay: Duration::ZERO });
        let aggregator = SearchAggregator::new(Some(web), Some(notes));

        let out = aggregator.search(&request(Some("u1"), true)).await;
        assert_eq!(out.web_count, 0);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].source_tag, SourceTag::Notes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_run_concurrently() {
        let web = Arc::new(FixedWeb { items: web_items(1), fail: false, delay: Duration::from_secs(2) });
        let notes = Arc::new(FixedNotes { items: Vec::new(), calls: AtomicUsize::new(0), delay: Duration::from_secs(2) });
        let aggregator = SearchAggregator::new(Some(web), Some(notes));

        let start = tokio::time::Instant::now();
        aggregator.search(&request(Some("u1"), true)).await;
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
