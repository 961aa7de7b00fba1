//! Tavily web search with academic / constants domain filtering

use super::{build_http_client, WebSearch};
use crate::errors::{AppError, Result};
use crate::models::{DomainMode, ResultItem, SearchDepth, SourceTag};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Academic allow-list; also decides `is_academic`
pub const ACADEMIC_DOMAINS: &[&str] = &[
    "arxiv.org",
    "mit.edu",
    "stanford.edu",
    "nature.com",
    "sciencedirect.com",
    "pubmed.ncbi.nlm.nih.gov",
    "scholar.google.com",
    "ieee.org",
    "acm.org",
    "springer.com",
    "wiley.com",
    "cambridge.org",
    "oxford.ac.uk",
    "jstor.org",
];

/// Physical constants and reference values
pub const CONSTANTS_DOMAINS: &[&str] = &[
    "nist.gov",
    "physics.nist.gov",
    "hyperphysics.phy-astr.gsu.edu",
    "wolframalpha.com",
    "physicsconstants.com",
];

/// Allow-list sent with a search, if any
pub fn domains_for(mode: DomainMode) -> Option<Vec<&'static str>> {
    match mode {
        DomainMode::General => None,
        DomainMode::Academic => Some(ACADEMIC_DOMAINS.to_vec()),
        DomainMode::Constants => Some(
            CONSTANTS_DOMAINS.iter()
                .chain(ACADEMIC_DOMAINS.iter().take(5))
                .copied()
                .collect(),
        ),
    }
}

fn is_academic(url: &str) -> bool {
    ACADEMIC_DOMAINS.iter().any(|d| url.contains(d))
}

/// Tavily API client
pub struct TavilySearch {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_images: bool,
    include_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_domains: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyItem>,
    #[serde(default)]
    images: Vec<TavilyImage>,
}

#[derive(Deserialize)]
struct TavilyItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    image_url: Option<String>,
}

/// Images come back either as bare URLs or as `{url, description}` objects
#[derive(Deserialize)]
#[serde(untagged)]
enum TavilyImage {
    Url(String),
    Described { url: String },
}

impl TavilyImage {
    fn into_url(self) -> String {
        match self {
            TavilyImage::Url(url) | TavilyImage::Described { url } => url,
        }
    }
}

impl TavilyResponse {
    /// Normalize into result items. Items without their own image borrow the
    /// response-level images in order.
    fn into_items(self) -> Vec<ResultItem> {
        let mut images = self.images.into_iter().map(TavilyImage::into_url);

        self.results
            .into_iter()
            .map(|item| {
                let url = item.url.filter(|u| !u.trim().is_empty());
                let content = item.content
                    .filter(|c| !c.trim().is_empty())
                    .or(item.snippet)
                    .unwrap_or_default();
                let image_url = item.image_url
                    .filter(|u| !u.trim().is_empty())
                    .or_else(|| images.next());

                let mut result = ResultItem::new(
                    item.title.unwrap_or_default(),
                    url,
                    content,
                    item.score.unwrap_or(0.5),
                    SourceTag::Web,
                );
                result.is_academic = result.url.as_deref().map_or(false, is_academic);
                result.image_url = image_url;
                result
            })
            .collect()
    }
}

impl TavilySearch {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint,
            api_key,
            client: build_http_client(timeout)?,
        })
    }

    /// Academic-only search (arXiv, MIT, Stanford, Nature, ...)
    pub async fn search_academic(&self, query: &str, max_results: usize) -> Result<Vec<ResultItem>> {
        self.search(query, max_results, SearchDepth::Advanced, DomainMode::Academic).await
    }

    /// Physical constants and reference values (NIST, HyperPhysics, ...)
    pub async fn search_constants(&self, query: &str, max_results: usize) -> Result<Vec<ResultItem>> {
        let enhanced = format!("{} value constant unit", query);
        self.search(&enhanced, max_results, SearchDepth::Advanced, DomainMode::Constants).await
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        depth: SearchDepth,
        mode: DomainMode,
    ) -> Result<Vec<ResultItem>> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::unavailable("tavily"));
        }

        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: depth.as_str(),
            include_images: true,
            include_answer: true,
            include_domains: domains_for(mode),
        };

        let response = self.client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::provider("tavily", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider("tavily", format!("API error {}: {}", status, body)));
        }

        let body: TavilyResponse = response.json().await
            .map_err(|e| AppError::provider("tavily", format!("failed to parse response: {}", e)))?;

        let items = body.into_items();
        tracing::debug!(query, results = items.len(), "Tavily search complete");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_constants_domains_include_first_academic_five() {
        let domains = domains_for(DomainMode::Constants).unwrap();
        assert_eq!(domains.len(), CONSTANTS_DOMAINS.len() + 5);
        assert!(domains.contains(&"nist.gov"));
        assert!(domains.contains(&"sciencedirect.com"));
        assert!(!domains.contains(&"pubmed.ncbi.nlm.nih.gov"));
        assert!(domains_for(DomainMode::General).is_none());
    }

    #[tokio::test]
    async fn test_search_normalizes_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "query": "ohm's law",
                "search_depth": "advanced",
                "include_domains": ACADEMIC_DOMAINS,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Paper", "url": "https://arxiv.org/abs/1", "content": "V = IR", "score": 0.9},
                    {"title": "Blog", "url": "https://example.com/ohm", "snippet": "short", "score": 0.4},
                    {"title": "No link", "content": "text"}
                ],
                "images": ["https://img.example.com/circuit.png"]
            })))
            .mount(&server)
            .await;

        let client = TavilySearch::new(server.uri(), "k".into(), Duration::from_secs(5)).unwrap();
        let items = client
            .search("ohm's law", 5, SearchDepth::Advanced, DomainMode::Academic)
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert!(items[0].is_academic);
        assert_eq!(items[0].image_url.as_deref(), Some("https://img.example.com/circuit.png"));
        assert_eq!(items[1].content, "short");
        assert!(!items[1].is_academic);
        assert_eq!(items[1].image_url, None);
        assert_eq!(items[2].url, None);
        assert_eq!(items[2].relevance_score, 0.5);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Web));
    }

    #[tokio::test]
    async fn test_constants_search_enhances_query_and_filters_domains() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "query": "speed of light value constant unit",
                "search_depth": "advanced",
                "include_domains": domains_for(DomainMode::Constants),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"title": "c", "url": "https://physics.nist.gov/c", "content": "c = 299792458 m/s"}]
            })))
            .mount(&server)
            .await;

        let client = TavilySearch::new(server.uri(), "k".into(), Duration::from_secs(5)).unwrap();
        let items = client.search_constants("speed of light", 3).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "c");

        // Unmatched body: academic search does not carry the constants suffix
        assert!(client.search_academic("speed of light", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_search_surfaces_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = TavilySearch::new(server.uri(), "bad".into(), Duration::from_secs(5)).unwrap();
        let result = client.search("q", 5, SearchDepth::Basic, DomainMode::General).await;
        assert!(matches!(result, Err(AppError::Provider { .. })));
    }
}
