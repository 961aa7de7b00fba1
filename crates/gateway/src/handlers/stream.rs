//! Server-sent event streaming of research progress

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{self, Stream};
use rag_agent::StreamEvent;
use rag_common::errors::{AppError, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::handlers::search::SearchRequest;
use crate::registry::StreamGuard;
use crate::AppState;

pub const STREAM_ID_HEADER: HeaderName = HeaderName::from_static("x-stream-id");

/// Start a research session and stream its events as `data: <json>` frames.
/// The stream id is returned in `X-Stream-Id`.
pub async fn search_stream(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse> {
    let request = request.into_research(&state.config)?;
    let query = request.query.clone();

    let running = state.publisher.start(request);
    let id = state.registry.connect(running.task.abort_handle());
    let guard = StreamGuard::new(state.registry.clone(), id);

    tracing::info!(stream_id = %id, query = %query, "Research stream started");

    let headers = [
        (STREAM_ID_HEADER, id.to_string()),
        (header::CACHE_CONTROL, "no-cache".to_string()),
        (HeaderName::from_static("x-accel-buffering"), "no".to_string()),
    ];

    Ok((headers, Sse::new(sse_events(running.events, guard)).keep_alive(KeepAlive::default())))
}

/// Drain the channel into SSE frames. The guard lives as long as the body,
/// so a disconnect deregisters the stream and drops the receiver.
fn sse_events(
    events: mpsc::Receiver<StreamEvent>,
    guard: StreamGuard,
) -> impl Stream<Item = std::result::Result<Event, axum::Error>> {
    stream::unfold((events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((Event::default().json_data(&event), (events, guard)))
    })
}

/// Cancel a running stream
pub async fn cancel_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::InvalidFormat {
        message: format!("invalid stream id: {}", id),
    })?;

    state.registry.cancel(&id)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({"cancelled": id}))))
}
