//! Agentic RAG control loop
//!
//! Drives multi-hop research over the search crate:
//! - [`Session`]: per-query state
//! - [`DecisionPolicy`]: stop / continue / refine after each hop
//! - [`ControlLoop`]: search -> rerank -> decide, then vision and synthesis
//! - [`AnswerSynthesizer`]: final answer and lab hints
//! - [`StreamPublisher`]: ordered progress events over a bounded channel

pub mod control;
pub mod decision;
pub mod events;
pub mod session;
pub mod stream;
pub mod synthesizer;

pub use control::{ControlLoop, NoopObserver, PhaseObserver, ResearchRequest};
pub use decision::{parse_evaluation, DecisionPolicy, DecisionState, Evaluation};
pub use events::StreamEvent;
pub use session::{ResearchResponse, Session};
pub use stream::{ResearchStream, StreamPublisher};
pub use synthesizer::{extract_lab_data, AnswerSynthesizer, FALLBACK_ANSWER};
