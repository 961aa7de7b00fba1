//! Decision policy for the research loop
//!
//! Runs once per hop, after rerank and before the next search:
//! 1. Hop budget exhausted -> stop
//! 2. Too little evidence -> continue with the same query
//! 3. Otherwise ask the evaluation model: sufficient, refine, or (if the
//!    reply carries neither marker) keep the previous flag

use crate::session::Session;
use crate::synthesizer::format_sources;
use rag_common::providers::FallbackChain;
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};

/// Minimum result count before the model is asked
pub const DEFAULT_EVIDENCE_THRESHOLD: usize = 5;

const EVALUATED_SOURCES: usize = 5;

const EVALUATION_SYSTEM: &str = "You are a research assistant evaluating search result quality.";

/// `SUFFICIENT` as the leading word of a line, optionally wrapped in quotes,
/// backticks or emphasis
static SUFFICIENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)^[\s*"'`]*sufficient\b"#).unwrap());

const REFINE_MARKER: &str = "refine:";

/// Outcome of one decision step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionState {
    /// Hop budget reached; proceed to the answer
    StopMaxHops,
    /// Below the evidence threshold; search again unchanged
    Insufficient,
    /// Model judged the evidence sufficient
    Sufficient,
    /// Model proposed a new query
    Refining(String),
    /// Model reply had no marker; flag left as it was
    Inconclusive,
}

/// Parsed evaluation reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Sufficient,
    Refine(String),
    Malformed,
}

/// Parse an evaluation reply.
///
/// The sufficiency marker counts only when it opens a line and appears before
/// any refine marker. Prose such as "the results are not sufficient" or
/// `INSUFFICIENT` never counts, and a refined query mentioning "sufficient"
/// is still a refinement.
pub fn parse_evaluation(text: &str) -> Evaluation {
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lowered = text.to_ascii_lowercase();
    let first_refine = lowered.find(REFINE_MARKER);

    let head = &text[..first_refine.unwrap_or(text.len())];
    if SUFFICIENT_MARKER.is_match(head) {
        return Evaluation::Sufficient;
    }

    let Some(last_refine) = lowered.rfind(REFINE_MARKER) else {
        return Evaluation::Malformed;
    };

    let query = text[last_refine + REFINE_MARKER.len()..]
        .lines()
        .map(|line| line.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '[' | ']' | '`')).trim())
        .find(|line| !line.is_empty());

    match query {
        Some(q) => Evaluation::Refine(q.to_string()),
        None => Evaluation::Malformed,
    }
}

pub struct DecisionPolicy {
    llm: Arc<FallbackChain>,
    evidence_threshold: usize,
}

impl DecisionPolicy {
    pub fn new(llm: Arc<FallbackChain>) -> Self {
        Self {
            llm,
            evidence_threshold: DEFAULT_EVIDENCE_THRESHOLD,
        }
    }

    pub fn with_evidence_threshold(mut self, threshold: usize) -> Self {
        self.evidence_threshold = threshold;
        self
    }

    /// Advance the session by one decision. Always increments `hop_count`
    /// and appends exactly one trace entry.
    pub async fn decide(&self, session: &mut Session) -> DecisionState {
        session.hop_count += 1;

        if session.hop_count >= session.hop_limit() {
            session.continue_flag = false;
            session.trace.push(format!("reached max hops ({})", session.hop_limit()));
            return DecisionState::StopMaxHops;
        }

        if session.results.len() < self.evidence_threshold {
            session.continue_flag = true;
            session.trace.push(format!(
                "insufficient results ({} < {}), continuing",
                session.results.len(),
                self.evidence_threshold
            ));
            return DecisionState::Insufficient;
        }

        let reply = self.llm.generate(&self.evaluation_prompt(session), EVALUATION_SYSTEM).await;

        match parse_evaluation(&reply) {
            Evaluation::Sufficient => {
                session.continue_flag = false;
                session.trace.push("results sufficient".to_string());
                DecisionState::Sufficient
            }
            Evaluation::Refine(query) if session.refine(&query) => {
                session.continue_flag = true;
                session.trace.push(format!("refining to: {}", query));
                DecisionState::Refining(query)
            }
            _ => {
                tracing::warn!(hop = session.hop_count, "Evaluation reply had no decision marker");
                session.trace.push("evaluation inconclusive, keeping previous decision".to_string());
                DecisionState::Inconclusive
            }
        }
    }

    fn evaluation_prompt(&self, session: &Session) -> String {
        let top = &session.results[..session.results.len().min(EVALUATED_SOURCES)];
        format!(
            "Query: {}\n\n\
             Current search results:\n{}\n\
             Evaluate if these results are sufficient to answer the query comprehensively.\n\
             If yes, respond with: SUFFICIENT\n\
             If no, respond with: REFINE: [new search query that would help]",
            session.original_query(),
            format_sources(top)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_common::errors::Result;
    use rag_common::models::{ResultItem, SourceTag};
    use rag_common::providers::TextGenerator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixed {
        reply: &'static str,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, prompt: &str, _system: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn policy(reply: &'static str) -> (DecisionPolicy, Arc<Fixed>) {
        let model = Arc::new(Fixed { reply, calls: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) });
        let providers: Vec<Arc<dyn TextGenerator>> = vec![model.clone()];
        (DecisionPolicy::new(Arc::new(FallbackChain::new(providers))), model)
    }

    fn session_with_results(n: usize, hop_limit: usize) -> Session {
        let mut session = Session::new("heat capacity", hop_limit).unwrap();
        session.results = (0..n)
            .map(|i| ResultItem::new("t", Some(format!("https://r/{}", i)), "c", 0.5, SourceTag::Web))
            .collect();
        session
    }

    #[test]
    fn test_parse_markers() {
        assert_eq!(parse_evaluation("SUFFICIENT"), Evaluation::Sufficient);
        assert_eq!(parse_evaluation("sufficient."), Evaluation::Sufficient);
        assert_eq!(parse_evaluation("**SUFFICIENT**"), Evaluation::Sufficient);
        assert_eq!(parse_evaluation("Looks complete.\nSUFFICIENT"), Evaluation::Sufficient);
        assert_eq!(parse_evaluation("The results are sufficient."), Evaluation::Malformed);
        assert_eq!(parse_evaluation("INSUFFICIENT coverage"), Evaluation::Malformed);
        assert_eq!(
            parse_evaluation("Not enough.\nREFINE: [specific heat of water]"),
            Evaluation::Refine("specific heat of water".into())
        );
        assert_eq!(
            parse_evaluation("refine: \"sufficient statistics definition\""),
            Evaluation::Refine("sufficient statistics definition".into())
        );
        assert_eq!(parse_evaluation("REFINE:   \n  "), Evaluation::Malformed);
        assert_eq!(parse_evaluation("Unable to process with LLM"), Evaluation::Malformed);
    }

    #[test]
    fn test_negated_prose_does_not_hide_refinement() {
        assert_eq!(
            parse_evaluation("The results are not sufficient.\nREFINE: specific heat of water"),
            Evaluation::Refine("specific heat of water".into())
        );
    }

    #[tokio::test]
    async fn test_max_hops_stops_without_model() {
        let (policy, model) = policy("REFINE: more");
        let mut session = session_with_results(8, 1);

        let state = policy.decide(&mut session).await;
        assert_eq!(state, DecisionState::StopMaxHops);
        assert!(!session.continue_flag);
        assert_eq!(session.hop_count, 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.trace.len(), 1);
    }

    #[tokio::test]
    async fn test_below_threshold_continues_with_same_query() {
        let (policy, model) = policy("SUFFICIENT");
        let mut session = session_with_results(4, 3);

        assert_eq!(policy.decide(&mut session).await, DecisionState::Insufficient);
        assert!(session.continue_flag);
        assert_eq!(session.working_query(), "heat capacity");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sufficient_stops() {
        let (policy, _) = policy("SUFFICIENT");
        let mut session = session_with_results(6, 3);

        assert_eq!(policy.decide(&mut session).await, DecisionState::Sufficient);
        assert!(!session.continue_flag);
        assert_eq!(session.last_trace(), Some("results sufficient"));
    }

    #[tokio::test]
    async fn test_refine_replaces_working_query() {
        let (policy, _) = policy("REFINE: heat capacity of ideal gases");
        let mut session = session_with_results(6, 3);

        let state = policy.decide(&mut session).await;
        assert_eq!(state, DecisionState::Refining("heat capacity of ideal gases".into()));
        assert!(session.continue_flag);
        assert_eq!(session.working_query(), "heat capacity of ideal gases");
        assert_eq!(session.original_query(), "heat capacity");
    }

    #[tokio::test]
    async fn test_evaluation_judges_against_original_query() {
        let (policy, model) = policy("SUFFICIENT");
        let mut session = session_with_results(6, 3);
        assert!(session.refine("heat capacity of diatomic gases"));

        policy.decide(&mut session).await;

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Query: heat capacity\n"));
        assert!(!prompts[0].contains("diatomic"));
    }

    #[tokio::test]
    async fn test_malformed_reply_retains_true_flag() {
        let (policy, _) = policy("I am not sure.");
        let mut session = session_with_results(6, 3);
        session.continue_flag = true;

        assert_eq!(policy.decide(&mut session).await, DecisionState::Inconclusive);
        assert!(session.continue_flag);
        assert_eq!(session.trace.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_retains_false_flag() {
        let (policy, _) = policy("I am not sure.");
        let mut session = session_with_results(6, 3);
        session.continue_flag = false;

        assert_eq!(policy.decide(&mut session).await, DecisionState::Inconclusive);
        assert!(!session.continue_flag);
        assert_eq!(session.working_query(), "heat capacity");
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_inconclusive() {
        let policy = DecisionPolicy::new(Arc::new(FallbackChain::new(Vec::new())));
        let mut session = session_with_results(6, 3);

        assert_eq!(policy.decide(&mut session).await, DecisionState::Inconclusive);
        assert!(session.continue_flag);
    }
}
