//! Agentic RAG Common Library
//!
//! Shared code for the research services:
//! - Domain model (result items, vision analysis, lab hints)
//! - Provider traits and clients (LLM, web, notes, scoring, vision)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod providers;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, ErrorCode, Result};
pub use models::{DomainMode, ExtractDomain, LabData, ResultItem, SearchDepth, SourceTag, VisionAnalysis};
pub use providers::Providers;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
