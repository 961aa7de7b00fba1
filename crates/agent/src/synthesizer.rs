//! Answer synthesis and lab hint extraction

use crate::session::Session;
use rag_common::models::{LabData, ResultItem, VisionAnalysis};
use rag_common::providers::FallbackChain;
use std::sync::Arc;

/// Answer used when no evidence was found
pub const FALLBACK_ANSWER: &str = "I couldn't find relevant information for your query.";

/// Characters of each source shown to the model
pub const EXCERPT_CHARS: usize = 500;

const ANSWER_SOURCES: usize = 10;
const HINT_SOURCES: usize = 5;

const ANSWER_SYSTEM: &str = "You are a PhD-level research assistant specializing in STEM subjects.";

/// An `=` plus any of these marks a physics hint
const PHYSICS_VARIABLES: &[char] = &['F', 'E', 'v', 'a', 'm'];

const CHEMISTRY_MARKERS: &[&str] = &["H₂", "O₂", "CO₂", "NaCl", "H2O", "CO2"];

/// Numbered source excerpts: `[i] title\nURL: url\nexcerpt\n`
pub(crate) fn format_sources(items: &[ResultItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let title = if item.title.trim().is_empty() { "Untitled" } else { &item.title };
            let excerpt: String = item.content.chars().take(EXCERPT_CHARS).collect();
            format!(
                "[{}] {}\nURL: {}\n{}\n",
                i + 1,
                title,
                item.url.as_deref().unwrap_or(""),
                excerpt
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lab hints from diagram variables plus keyword scans of the top results
pub fn extract_lab_data(results: &[ResultItem], vision: Option<&VisionAnalysis>) -> Option<LabData> {
    let mut data = LabData::default();

    if let Some(vision) = vision.filter(|v| !v.extracted_variables.is_empty()) {
        data.variables = Some(vision.extracted_variables.clone());
    }

    for item in results.iter().take(HINT_SOURCES) {
        if item.content.contains('=') && item.content.contains(PHYSICS_VARIABLES) {
            data.physics_hints = true;
        }
        if CHEMISTRY_MARKERS.iter().any(|m| item.content.contains(m)) {
            data.chemistry_hints = true;
        }
    }

    if data.is_empty() { None } else { Some(data) }
}

pub struct AnswerSynthesizer {
    llm: Arc<FallbackChain>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<FallbackChain>) -> Self {
        Self { llm }
    }

    /// Fill `final_answer` and `lab_data`
    pub async fn synthesize(&self, session: &mut Session) {
        if session.results.is_empty() {
            session.final_answer = Some(FALLBACK_ANSWER.to_string());
            session.lab_data = None;
            return;
        }

        let prompt = self.build_prompt(session);
        let answer = self.llm.generate(&prompt, ANSWER_SYSTEM).await;

        session.lab_data = extract_lab_data(&session.results, session.vision_findings.as_ref());
        session.final_answer = Some(answer);
    }

    fn build_prompt(&self, session: &Session) -> String {
        let top = &session.results[..session.results.len().min(ANSWER_SOURCES)];

        let mut prompt = format!(
            "Based on the following search results, provide a comprehensive answer to the query.\n\n\
             Query: {}\n\n\
             Sources:\n{}\n\
             Provide a well-structured answer with:\n\
             1. Direct answer to the query\n\
             2. Key supporting information from the sources, cited as [n]\n\
             3. Any relevant equations, formulas, or data (if applicable)\n\n\
             Format any mathematical expressions in LaTeX where appropriate.",
            session.original_query(),
            format_sources(top)
        );

        if let Some(vision) = &session.vision_findings {
            let analysis = serde_json::to_string(vision).unwrap_or_else(|_| vision.description.clone());
            prompt.push_str(&format!("\n\nDiagram analysis: {}", analysis));
        }

        prompt
    }
}
