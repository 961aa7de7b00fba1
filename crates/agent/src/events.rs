//! Progress events emitted while a session runs

use crate::session::ResearchResponse;
use rag_common::models::{SourceTag, VisionAnalysis};
use serde::{Deserialize, Serialize};

/// One phase transition, serialized as `{"type": "...", ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Thinking {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<usize>,
    },
    Searching {
        iteration: usize,
        query: String,
        source: SourceTag,
        message: String,
    },
    Results {
        iteration: usize,
        count: usize,
        source: SourceTag,
    },
    Reranking {
        count: usize,
        message: String,
    },
    Refining {
        iteration: usize,
        reason: String,
        new_query: String,
        message: String,
    },
    Vision {
        message: String,
        count: usize,
    },
    VisionResult {
        image_url: String,
        analysis: VisionAnalysis,
    },
    Generating {
        message: String,
    },
    Result(ResearchResponse),
    Error {
        message: String,
    },
    Done {},
}

impl StreamEvent {
    /// Value of the `type` discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::Searching { .. } => "searching",
            StreamEvent::Results { .. } => "results",
            StreamEvent::Reranking { .. } => "reranking",
            StreamEvent::Refining { .. } => "refining",
            StreamEvent::Vision { .. } => "vision",
            StreamEvent::VisionResult { .. } => "vision_result",
            StreamEvent::Generating { .. } => "generating",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done {} => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done {} | StreamEvent::Error { .. })
    }

    pub(crate) fn thinking(message: impl Into<String>, iteration: Option<usize>) -> Self {
        StreamEvent::Thinking { message: message.into(), iteration }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_events_carry_type_discriminator() {
        let event = StreamEvent::Results { iteration: 2, count: 7, source: SourceTag::Notes };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "results", "iteration": 2, "count": 7, "source": "notes"})
        );

        assert_eq!(serde_json::to_value(StreamEvent::Done {}).unwrap(), json!({"type": "done"}));
        assert_eq!(
            serde_json::to_value(StreamEvent::thinking("Analyzing your query...", None)).unwrap(),
            json!({"type": "thinking", "message": "Analyzing your query..."})
        );
    }

    #[test]
    fn test_result_event_flattens_response() {
        let event = StreamEvent::Result(ResearchResponse {
            query: "q".into(),
            answer: "a".into(),
            sources: Vec::new(),
            iterations: 1,
            lab_data: None,
            vision_analysis: None,
        });
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "result");
        assert_eq!(value["iterations"], 1);
        assert!(value["lab_data"].is_null());
        assert_eq!(event.kind(), "result");
    }

    #[test]
    fn test_kind_matches_serialized_type() {
        let events = vec![
            StreamEvent::VisionResult { image_url: "u".into(), analysis: VisionAnalysis::default() },
            StreamEvent::Error { message: "boom".into() },
            StreamEvent::Generating { message: "m".into() },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }
}
