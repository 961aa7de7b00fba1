//! Relevance scorers

use super::{build_http_client, RelevanceScorer};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Cross-encoder served over HTTP.
///
/// `POST {endpoint}/rerank` with `{"query", "texts"}`, answered by
/// `[{"index", "score"}, ...]` in any order.
pub struct HttpCrossEncoder {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

impl HttpCrossEncoder {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl RelevanceScorer for HttpCrossEncoder {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        let scores = self.score_batch(query, &[text.to_string()]).await?;
        scores.into_iter().next().ok_or_else(|| AppError::ScoringFailure {
            message: "empty response from cross-encoder".to_string(),
        })
    }

    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.client
            .post(format!("{}/rerank", self.endpoint))
            .json(&RerankRequest { query, texts })
            .send()
            .await
            .map_err(|e| AppError::ScoringFailure {
                message: format!("cross-encoder request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::ScoringFailure {
                message: format!("cross-encoder returned {}", response.status()),
            });
        }

        let hits: Vec<RerankHit> = response.json().await.map_err(|e| AppError::ScoringFailure {
            message: format!("invalid cross-encoder response: {}", e),
        })?;

        let mut scores = vec![None; texts.len()];
        for hit in hits {
            if let Some(slot) = scores.get_mut(hit.index) {
                *slot = Some(hit.score);
            }
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                s.ok_or_else(|| AppError::ScoringFailure {
                    message: format!("cross-encoder returned no score for text {}", i),
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "cross-encoder"
    }
}

/// Term-overlap scorer used when no cross-encoder is deployed.
///
/// Score is the fraction of distinct query terms found in the text, in [0, 1].
#[derive(Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self {
        Self
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl RelevanceScorer for LexicalScorer {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(0.0);
        }
        let text_terms = terms(text);
        let hits = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
        Ok(hits as f32 / query_terms.len() as f32)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lexical_scores_overlap() {
        let scorer = LexicalScorer::new();
        let full = scorer.score("ideal gas law", "The ideal gas law relates P, V and T").await.unwrap();
        let partial = scorer.score("ideal gas law", "An ideal spring").await.unwrap();
        let none = scorer.score("ideal gas law", "photosynthesis").await.unwrap();

        assert_eq!(full, 1.0);
        assert!(partial > 0.0 && partial < 1.0);
        assert_eq!(none, 0.0);
        assert_eq!(scorer.score("?", "anything").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_cross_encoder_reorders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_partial_json(serde_json::json!({"query": "entropy"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"index": 1, "score": 0.9},
                {"index": 0, "score": 0.1}
            ])))
            .mount(&server)
            .await;

        let scorer = HttpCrossEncoder::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        let scores = scorer
            .score_batch("entropy", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.1, 0.9]);
    }

    #[tokio::test]
    async fn test_cross_encoder_missing_score_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"index": 0, "score": 0.3}
            ])))
            .mount(&server)
            .await;

        let scorer = HttpCrossEncoder::new(server.uri(), Duration::from_secs(5)).unwrap();
        let result = scorer.score_batch("q", &["a".to_string(), "b".to_string()]).await;
        assert!(matches!(result, Err(AppError::ScoringFailure { .. })));
    }
}
