//! Per-query research state
//!
//! A session is created for one incoming query and owned by exactly one
//! control-loop run. Nothing in it is shared across requests.

use rag_common::errors::{AppError, Result};
use rag_common::models::{LabData, ResultItem, VisionAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sources returned to the caller
pub const MAX_RESPONSE_SOURCES: usize = 10;

#[derive(Debug, Clone)]
pub struct Session {
    original_query: String,
    working_query: String,
    hop_limit: usize,

    /// Current evidence; replaced after every fusion/rerank pass
    pub results: Vec<ResultItem>,
    /// Incremented once per decision; never exceeds `hop_limit`
    pub hop_count: usize,
    pub continue_flag: bool,
    /// One entry per decision, in order
    pub trace: Vec<String>,

    pub final_answer: Option<String>,
    pub lab_data: Option<LabData>,
    pub vision_findings: Option<VisionAnalysis>,
}

impl Session {
    pub fn new(query: &str, hop_limit: usize) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }
        if hop_limit == 0 {
            return Err(AppError::Validation {
                message: "max_hops must be at least 1".to_string(),
                field: Some("max_hops".to_string()),
            });
        }

        Ok(Self {
            original_query: query.to_string(),
            working_query: query.to_string(),
            hop_limit,
            results: Vec::new(),
            hop_count: 0,
            continue_flag: true,
            trace: Vec::new(),
            final_answer: None,
            lab_data: None,
            vision_findings: None,
        })
    }

    pub fn original_query(&self) -> &str {
        &self.original_query
    }

    pub fn working_query(&self) -> &str {
        &self.working_query
    }

    pub fn hop_limit(&self) -> usize {
        self.hop_limit
    }

    /// Replace the working query. Blank queries are rejected so the working
    /// query is never empty.
    pub fn refine(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        self.working_query = query.to_string();
        true
    }

    /// Loop condition
    pub fn should_search(&self) -> bool {
        self.continue_flag && self.hop_count < self.hop_limit
    }

    /// This hop's results first, then earlier evidence whose url is not
    /// already present. Items without a url are always kept.
    pub fn combine(&self, fresh: Vec<ResultItem>) -> Vec<ResultItem> {
        let mut seen: HashSet<String> = fresh
            .iter()
            .filter_map(|r| r.identity().map(str::to_string))
            .collect();

        let mut combined = fresh;
        for item in &self.results {
            match item.identity() {
                Some(url) if !seen.insert(url.to_string()) => {}
                _ => combined.push(item.clone()),
            }
        }
        combined
    }

    pub fn last_trace(&self) -> Option<&str> {
        self.trace.last().map(String::as_str)
    }

    /// Final payload shared by the sync response and the `result` event
    pub fn to_response(&self) -> ResearchResponse {
        ResearchResponse {
            query: self.original_query.clone(),
            answer: self.final_answer.clone().unwrap_or_default(),
            sources: self.results.iter().take(MAX_RESPONSE_SOURCES).cloned().collect(),
            iterations: self.hop_count,
            lab_data: self.lab_data.clone(),
            vision_analysis: self.vision_findings.clone(),
        }
    }
}

/// Completed research result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<ResultItem>,
    pub iterations: usize,
    pub lab_data: Option<LabData>,
    pub vision_analysis: Option<VisionAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_common::models::SourceTag;

    fn item(title: &str, url: Option<&str>) -> ResultItem {
        ResultItem::new(title, url.map(str::to_string), "c", 0.5, SourceTag::Web)
    }

    #[test]
    fn test_new_session_rejects_empty_query_and_zero_hops() {
        assert!(Session::new("   ", 3).is_err());
        assert!(Session::new("entropy", 0).is_err());

        let session = Session::new("  entropy ", 3).unwrap();
        assert_eq!(session.original_query(), "entropy");
        assert_eq!(session.working_query(), "entropy");
        assert!(session.should_search());
    }

    #[test]
    fn test_refine_never_empties_working_query() {
        let mut session = Session::new("entropy", 3).unwrap();
        assert!(!session.refine("  "));
        assert_eq!(session.working_query(), "entropy");
        assert!(session.refine("entropy of mixing"));
        assert_eq!(session.working_query(), "entropy of mixing");
        assert_eq!(session.original_query(), "entropy");
    }

    #[test]
    fn test_combine_puts_fresh_first_and_drops_known_urls() {
        let mut session = Session::new("q", 3).unwrap();
        session.results = vec![item("old a", Some("https://a")), item("old b", Some("https://b")), item("loose", None)];

        let combined = session.combine(vec![item("new a", Some("https://a")), item("new c", Some("https://c"))]);
        let titles: Vec<&str> = combined.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["new a", "new c", "old b", "loose"]);
    }

    #[test]
    fn test_response_caps_sources() {
        let mut session = Session::new("q", 1).unwrap();
        session.results = (0..15).map(|i| item(&i.to_string(), None)).collect();
        session.hop_count = 1;

        let response = session.to_response();
        assert_eq!(response.sources.len(), MAX_RESPONSE_SOURCES);
        assert_eq!(response.iterations, 1);
        assert_eq!(response.answer, "");
    }
}
