//! Shared domain types
//!
//! One normalized shape for evidence items, whatever provider produced them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Where a result item came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Web search provider
    Web,
    /// Private notes provider
    Notes,
    /// Merged from more than one source by rank fusion
    Fused,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Web => "web",
            SourceTag::Notes => "notes",
            SourceTag::Fused => "fused",
        }
    }
}

/// A single piece of evidence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultItem {
    pub title: String,

    /// Identity key for deduplication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub content: String,

    /// Provider-assigned score (replaced by the fused score after RRF)
    pub relevance_score: f32,

    pub source_tag: SourceTag,

    #[serde(default)]
    pub is_academic: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Set by the reranker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl ResultItem {
    /// Create an item with the required fields; optional fields start empty
    pub fn new(
        title: impl Into<String>,
        url: Option<String>,
        content: impl Into<String>,
        relevance_score: f32,
        source_tag: SourceTag,
    ) -> Self {
        Self {
            title: title.into(),
            url,
            content: content.into(),
            relevance_score,
            source_tag,
            is_academic: false,
            image_url: None,
            rerank_score: None,
        }
    }

    /// Deduplication key: the url, when present and non-empty
    pub fn identity(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Text used for relevance scoring: content, or title when content is empty
    pub fn scoring_text(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.title
        } else {
            &self.content
        }
    }
}

/// Web search depth
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

impl FromStr for SearchDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(SearchDepth::Basic),
            "advanced" => Ok(SearchDepth::Advanced),
            other => Err(format!("unknown search depth: {}", other)),
        }
    }
}

/// Domain allow-list applied by the web search provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DomainMode {
    #[default]
    General,
    Academic,
    Constants,
}

impl FromStr for DomainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(DomainMode::General),
            "academic" => Ok(DomainMode::Academic),
            "constants" => Ok(DomainMode::Constants),
            other => Err(format!("unknown domain mode: {}", other)),
        }
    }
}

/// Subject the image analyzer extracts for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractDomain {
    #[default]
    Physics,
    Chemistry,
    Math,
}

impl fmt::Display for ExtractDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractDomain::Physics => "physics",
            ExtractDomain::Chemistry => "chemistry",
            ExtractDomain::Math => "math",
        };
        f.write_str(name)
    }
}

/// Structured extraction from a diagram
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisionAnalysis {
    pub domain: ExtractDomain,
    pub raw_analysis: String,
    pub extracted_variables: BTreeMap<String, String>,
    pub equations: Vec<String>,
    pub components: Vec<String>,
    pub description: String,
}

impl VisionAnalysis {
    /// Whether the analyzer produced anything usable
    pub fn is_empty(&self) -> bool {
        self.raw_analysis.trim().is_empty()
            && self.extracted_variables.is_empty()
            && self.equations.is_empty()
            && self.components.is_empty()
            && self.description.trim().is_empty()
    }
}

/// Hints handed to the interactive labs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub physics_hints: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub chemistry_hints: bool,
}

impl LabData {
    pub fn is_empty(&self) -> bool {
        self.variables.is_none() && !self.physics_hints && !self.chemistry_hints
    }
}
