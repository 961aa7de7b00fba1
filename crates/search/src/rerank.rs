//! Cross-encoder style reranking with graceful degradation

use rag_common::metrics;
use rag_common::models::ResultItem;
use rag_common::providers::RelevanceScorer;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default number of items kept after reranking
pub const DEFAULT_TOP_K: usize = 10;

/// Characters of item text sent to the scorer
pub const DEFAULT_MAX_TEXT_CHARS: usize = 500;

/// Reorders a result set by pairwise (query, text) relevance.
///
/// The scorer is shared across sessions; calls go through a semaphore so
/// concurrent sessions cannot exhaust it.
#[derive(Clone)]
pub struct RerankEngine {
    scorer: Option<Arc<dyn RelevanceScorer>>,
    gate: Arc<Semaphore>,
    max_text_chars: usize,
}

impl RerankEngine {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>, max_concurrency: usize) -> Self {
        Self {
            scorer,
            gate: Arc::new(Semaphore::new(max_concurrency.max(1))),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }

    /// Engine that only truncates
    pub fn disabled() -> Self {
        Self::new(None, 1)
    }

    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars.max(1);
        self
    }

    /// Rerank `items` against `query` and keep the best `top_k`.
    ///
    /// Without a scorer, or if scoring fails, the first `top_k` items are
    /// returned in their incoming order.
    pub async fn rerank(&self, query: &str, mut items: Vec<ResultItem>, top_k: usize) -> Vec<ResultItem> {
        let Some(scorer) = self.scorer.as_ref() else {
            items.truncate(top_k);
            metrics::record_rerank("passthrough");
            return items;
        };

        if items.is_empty() {
            return items;
        }

        let texts: Vec<String> = items
            .iter()
            .map(|item| item.scoring_text().chars().take(self.max_text_chars).collect())
            .collect();

        let scores = match self.gate.acquire().await {
            Ok(_permit) => scorer.score_batch(query, &texts).await,
            Err(_) => {
                tracing::warn!("Rerank gate closed, skipping scoring");
                items.truncate(top_k);
                metrics::record_rerank("fallback");
                return items;
            }
        };

        match scores {
            Ok(scores) if scores.len() == items.len() => {
                for (item, score) in items.iter_mut().zip(scores) {
                    item.rerank_score = Some(score);
                }
                items.sort_by(|a, b| {
                    b.rerank_score
                        .partial_cmp(&a.rerank_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                items.truncate(top_k);
                metrics::record_rerank("scored");
                items
            }
            Ok(scores) => {
                tracing::warn!(
                    scorer = scorer.name(),
                    expected = items.len(),
                    got = scores.len(),
                    "Scorer returned wrong number of scores, using unscored order"
                );
                items.truncate(top_k);
                metrics::record_rerank("fallback");
                items
            }
            Err(e) => {
                tracing::warn!(scorer = scorer.name(), error = %e, "Reranking failed, using unscored order");
                items.truncate(top_k);
                metrics::record_rerank("fallback");
                items
            }
        }
    }
}
