//! Collection progress events
//!
//! The orchestrator emits these while a run progresses so a presentation
//! layer can show live progress. Nothing in the pipeline depends on anyone
//! listening.

use crate::models::{Platform, StopReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Collection event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CollectionEvent {
    /// A run left Idle and is about to request its first page
    RunStarted {
        run_id: Uuid,
        platform: Platform,
        app_id: String,
        country: String,
        max_reviews: usize,
        timestamp: DateTime<Utc>,
    },

    /// A page was fetched and processed
    PageProcessed {
        run_id: Uuid,
        /// 0-based page index within the run
        page_index: usize,
        /// Raw reviews on the page
        received: usize,
        /// Records accepted from this page
        accepted: usize,
        /// Records dropped as malformed from this page
        dropped: usize,
        /// Records collected so far in the run
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A page fetch failed with a retryable error and will be retried
    RetryScheduled {
        run_id: Uuid,
        page_index: usize,
        /// Attempt number that failed (1-based)
        attempt: u32,
        delay_ms: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Run reached Done or Aborted
    RunFinished {
        run_id: Uuid,
        requested: usize,
        collected: usize,
        dropped: usize,
        stop_reason: StopReason,
        timestamp: DateTime<Utc>,
    },
}

impl CollectionEvent {
    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            CollectionEvent::RunStarted { run_id, .. }
            | CollectionEvent::PageProcessed { run_id, .. }
            | CollectionEvent::RetryScheduled { run_id, .. }
            | CollectionEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast channel for collection events
///
/// Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CollectionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CollectionEvent,
    ) -> Result<usize, broadcast::error::SendError<CollectionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CollectionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
