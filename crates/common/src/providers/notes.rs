//! Private notes search

use super::NotesSearch;
use crate::errors::Result;
use crate::models::ResultItem;
use async_trait::async_trait;

/// Placeholder until the notes service exposes a search API. Always returns
/// no results so the aggregator keeps web order untouched.
pub struct StubNotesSearch {
    service_url: Option<String>,
}

impl StubNotesSearch {
    pub fn new(service_url: Option<String>) -> Self {
        Self { service_url }
    }
}

#[async_trait]
impl NotesSearch for StubNotesSearch {
    async fn search_notes(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<ResultItem>> {
        tracing::debug!(
            query,
            user_id,
            limit,
            service_url = self.service_url.as_deref().unwrap_or("unset"),
            "Notes search not wired to the notes service yet"
        );
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_returns_nothing() {
        let notes = StubNotesSearch::new(Some("http://notes:8083".into()));
        let results = tokio_test::assert_ok!(notes.search_notes("entropy", "user-1", 5).await);
        assert!(results.is_empty());
    }
}
