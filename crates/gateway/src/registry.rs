//! Active stream registry
//!
//! Owns the mapping from stream id to the task producing it, so a stream can
//! be cancelled from another request and counted for health/metrics.

use rag_common::errors::{AppError, Result};
use rag_common::metrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::task::AbortHandle;
use uuid::Uuid;

struct ActiveStream {
    abort: AbortHandle,
    started_at: Instant,
}

#[derive(Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<Mutex<HashMap<Uuid, ActiveStream>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveStream>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a running stream and return its id
    pub fn connect(&self, abort: AbortHandle) -> Uuid {
        let id = Uuid::new_v4();
        let mut streams = self.lock();
        streams.insert(id, ActiveStream { abort, started_at: Instant::now() });
        metrics::set_active_streams(streams.len());
        tracing::debug!(stream_id = %id, active = streams.len(), "Stream connected");
        id
    }

    /// Forget a stream; returns whether it was registered
    pub fn disconnect(&self, id: &Uuid) -> bool {
        let mut streams = self.lock();
        let removed = streams.remove(id);
        metrics::set_active_streams(streams.len());

        if let Some(stream) = &removed {
            tracing::debug!(
                stream_id = %id,
                duration_ms = stream.started_at.elapsed().as_millis() as u64,
                "Stream disconnected"
            );
        }
        removed.is_some()
    }

    /// Abort a stream's producer and forget it
    pub fn cancel(&self, id: &Uuid) -> Result<()> {
        let stream = {
            let mut streams = self.lock();
            let stream = streams.remove(id);
            metrics::set_active_streams(streams.len());
            stream
        };

        match stream {
            Some(stream) => {
                stream.abort.abort();
                tracing::info!(stream_id = %id, "Stream cancelled");
                Ok(())
            }
            None => Err(AppError::StreamNotFound { id: id.to_string() }),
        }
    }

    /// Abort every active stream; used on shutdown
    pub fn cancel_all(&self) -> usize {
        let streams: Vec<(Uuid, ActiveStream)> = self.lock().drain().collect();
        metrics::set_active_streams(0);
        for (_, stream) in &streams {
            stream.abort.abort();
        }
        streams.len()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }
}

/// Deregisters a stream when the response body is dropped
pub struct StreamGuard {
    registry: StreamRegistry,
    id: Uuid,
}

impl StreamGuard {
    pub fn new(registry: StreamRegistry, id: Uuid) -> Self {
        Self { registry, id }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.id);
    }
}
