//! # Event Bus System
//!
//! Broadcasts sync progress to any number of listeners using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: a strongly-typed enum hierarchy, one variant per domain
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: wrapper for consuming events with filtering
//!
//! ```text
//! ┌──────────────────┐     emit      ┌───────────┐     subscribe    ┌────────────┐
//! │ SyncOrchestrator ├──────────────>│ EventBus  ├─────────────────>│ Subscriber │
//! └──────────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! Emitting never blocks the pipeline. A bus without subscribers drops events.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut failures = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Sync(SyncEvent::Failed { .. })));
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Failed {
//!     run_id: "run-1".to_string(),
//!     route: "notes".to_string(),
//!     relative_path: "daily.md".to_string(),
//!     stage: "upload_media_stage1".to_string(),
//!     message: "upload rejected".to_string(),
//! }))
//! .ok();
//!
//! let event = failures.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync failed");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-related events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::RecreationPending { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { warnings, .. }) if *warnings > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::StageEntered { .. }) => EventSeverity::Debug,
        }
    }
}

/// How loudly a listener should surface an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Stage transitions
    Debug,
    /// Clean completions
    Info,
    /// Completions with warnings, pending recreations
    Warning,
    /// Failed runs
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by one document sync run.
///
/// Stage and direction names are the snake_case names used in logs, so the
/// runtime does not depend on the sync crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// The run moved to a new pipeline stage.
    StageEntered {
        /// Unique identifier of the sync run.
        run_id: String,
        /// Route the document belongs to.
        route: String,
        /// Document path relative to the route's source root.
        relative_path: String,
        /// Stage entered.
        stage: String,
    },
    /// The run finished and its record was persisted.
    Completed {
        /// Unique identifier of the sync run.
        run_id: String,
        /// Route the document belongs to.
        route: String,
        /// Document path relative to the route's source root.
        relative_path: String,
        /// `forward` or `reverse`.
        direction: String,
        /// Whether destinations were created rather than updated.
        created: bool,
        /// Number of media uploads performed across both legs.
        media_uploaded: u64,
        /// Number of recoverable problems reported with the outcome.
        warnings: u64,
    },
    /// The run stopped with an error.
    Failed {
        /// Unique identifier of the sync run.
        run_id: String,
        /// Route the document belongs to.
        route: String,
        /// Document path relative to the route's source root.
        relative_path: String,
        /// Stage that was running when the failure occurred.
        stage: String,
        /// Human-readable error message.
        message: String,
    },
    /// A recreated HTML document is live but the old one may still exist.
    RecreationPending {
        /// Route the document belongs to.
        route: String,
        /// Document path relative to the route's source root.
        relative_path: String,
        /// Identifier of the document being replaced.
        previous_id: String,
        /// Identifier of the replacement document.
        replacement_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::StageEntered { .. } => "Sync stage entered",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::RecreationPending { .. } => "Document recreation needs reconciliation",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Fan-out channel for sync progress.
///
/// Cloning the bus is cheap; clones publish to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus that buffers `capacity` events per subscriber.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes `event` to every live subscriber.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Predicate applied by [`EventStream`].
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A subscriber that only yields events accepted by its predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Wraps `receiver` without a predicate.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
