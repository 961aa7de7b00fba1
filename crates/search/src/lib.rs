//! Agentic RAG Search
//!
//! Evidence gathering for one hop:
//! - Concurrent web / notes fan-out ([`SearchAggregator`])
//! - Reciprocal Rank Fusion ([`FusionEngine`])
//! - Relevance reranking with a bounded scorer gate ([`RerankEngine`])

pub mod aggregator;
pub mod fusion;
pub mod rerank;

pub use aggregator::{Aggregated, SearchAggregator, SearchRequest};
pub use fusion::{FusedItem, FusionEngine};
pub use rerank::RerankEngine;
