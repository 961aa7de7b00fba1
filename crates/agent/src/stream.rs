//! Streaming adapter over the control loop
//!
//! The loop runs on its own task and pushes events into a bounded channel.
//! A full channel makes the loop wait; a dropped receiver aborts the loop at
//! its next suspension point.

use crate::control::{ControlLoop, PhaseObserver, ResearchRequest};
use crate::events::StreamEvent;
use async_trait::async_trait;
use rag_common::errors::{AppError, Result};
use rag_common::metrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default channel capacity
pub const DEFAULT_BUFFER: usize = 32;

/// Forwards events into the stream channel
struct ChannelObserver {
    tx: mpsc::Sender<StreamEvent>,
}

#[async_trait]
impl PhaseObserver for ChannelObserver {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        let kind = event.kind();
        self.tx.send(event).await.map_err(|_| AppError::Cancelled)?;
        metrics::record_stream_event(kind);
        Ok(())
    }
}

/// A running research stream
pub struct ResearchStream {
    pub events: mpsc::Receiver<StreamEvent>,
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct StreamPublisher {
    control: Arc<ControlLoop>,
    buffer: usize,
}

impl StreamPublisher {
    pub fn new(control: Arc<ControlLoop>, buffer: usize) -> Self {
        Self { control, buffer: buffer.max(1) }
    }

    /// Start a session on a background task.
    ///
    /// Ends with `done` after `result`, or with a single `error` event if the
    /// session fails.
    pub fn start(&self, request: ResearchRequest) -> ResearchStream {
        let (tx, events) = mpsc::channel(self.buffer);
        let control = self.control.clone();

        let task = tokio::spawn(async move {
            let observer = ChannelObserver { tx: tx.clone() };

            tokio::select! {
                _ = tx.closed() => {
                    tracing::info!(query = %request.query, "Stream consumer disconnected, abandoning session");
                }
                outcome = control.run_observed(&request, &observer) => {
                    let last = match outcome {
                        Ok(_) => Some(StreamEvent::Done {}),
                        Err(AppError::Cancelled) => None,
                        Err(e) => Some(StreamEvent::Error { message: e.to_string() }),
                    };
                    if let Some(event) = last {
                        let _ = observer.emit(event).await;
                    }
                }
            }
        });

        ResearchStream { events, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::{control, CountingWeb, Script};
    use rag_common::models::{DomainMode, ResultItem, SearchDepth};
    use rag_common::providers::WebSearch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn collect(mut stream: ResearchStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.events.recv().await {
            events.push(event);
        }
        events
    }

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_event_order_for_refine_then_sufficient() {
        let web = CountingWeb::new(6);
        let control = Arc::new(control(web, Script::new(&["REFINE: narrower", "SUFFICIENT", "answer"]), None));
        let publisher = StreamPublisher::new(control, 4);

        let mut request = ResearchRequest::new("broad", 3);
        request.user_id = Some("u1".into());
        let events = collect(publisher.start(request)).await;

        assert_eq!(
            kinds(&events),
            vec![
                "thinking",
                "searching", "searching", "results", "results", "reranking", "thinking", "refining",
                "searching", "searching", "results", "results", "reranking", "thinking",
                "generating", "result", "done",
            ]
        );

        match &events[7] {
            StreamEvent::Refining { iteration, new_query, reason, .. } => {
                assert_eq!(*iteration, 1);
                assert_eq!(new_query, "narrower");
                assert_eq!(reason, "refining to: narrower");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &events[events.len() - 2] {
            StreamEvent::Result(response) => {
                assert_eq!(response.iterations, 2);
                assert_eq!(response.query, "broad");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_reranking_event_without_results() {
        let control = Arc::new(control(CountingWeb::new(0), Script::new(&[]), None));
        let publisher = StreamPublisher::new(control, DEFAULT_BUFFER);
        let events = collect(publisher.start(ResearchRequest::new("q", 1))).await;

        assert_eq!(
            kinds(&events),
            vec!["thinking", "searching", "results", "thinking", "generating", "result", "done"]
        );
    }

    #[tokio::test]
    async fn test_failure_ends_with_single_error_event() {
        let control = Arc::new(control(CountingWeb::new(1), Script::new(&[]), None));
        let publisher = StreamPublisher::new(control, DEFAULT_BUFFER);
        let events = collect(publisher.start(ResearchRequest::new("", 2))).await;

        assert_eq!(kinds(&events), vec!["error"]);
        assert!(events[0].is_terminal());
    }

    /// Web search that never returns
    struct Hanging {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WebSearch for Hanging {
        async fn search(&self, _q: &str, _n: usize, _d: SearchDepth, _m: DomainMode) -> Result<Vec<ResultItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_dropped_consumer_abandons_in_flight_search() {
        let web = Arc::new(Hanging { calls: AtomicUsize::new(0) });
        let control = Arc::new(control(web.clone(), Script::new(&[]), None));
        let publisher = StreamPublisher::new(control, DEFAULT_BUFFER);

        let mut stream = publisher.start(ResearchRequest::new("q", 3));
        // thinking, searching(web)
        assert!(stream.events.recv().await.is_some());
        assert!(stream.events.recv().await.is_some());

        let ResearchStream { events, task } = stream;
        drop(events);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("session task should stop after the consumer leaves")
            .unwrap();
        assert_eq!(web.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_small_buffer_applies_backpressure_without_dropping() {
        let control = Arc::new(control(CountingWeb::new(6), Script::new(&["garbage"]), None));
        let publisher = StreamPublisher::new(control, 1);

        let mut stream = publisher.start(ResearchRequest::new("q", 3));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stream.task.is_finished());

        let mut events = Vec::new();
        while let Some(event) = stream.events.recv().await {
            events.push(event);
        }
        assert_eq!(events.last().map(StreamEvent::kind), Some("done"));
        assert_eq!(events.iter().filter(|e| e.kind() == "result").count(), 1);
    }
}
