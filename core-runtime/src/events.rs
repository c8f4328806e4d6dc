//! # Event Bus System
//!
//! Progress reporting for metadata batches over `core_async::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: [`CoreEvent`] wrapping [`ExtractionEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Emission is best effort. A batch with no subscribers runs exactly the same
//! as one being watched, and a slow subscriber only ever sees
//! `RecvError::Lagged`; it never holds up extraction.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, ExtractionEvent};
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(32);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Extraction(ExtractionEvent::BatchCompleted { .. })));
//!
//! bus.emit(CoreEvent::Extraction(ExtractionEvent::BatchCompleted {
//!     batch_id: Uuid::new_v4(),
//!     succeeded: 3,
//!     failed: 1,
//!     duration_ms: 12,
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(event.description().contains("finished"));
//! # }
//! ```

use core_async::sync::broadcast::{self, error::SendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub use core_async::sync::broadcast::error::RecvError;
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Metadata extraction progress
    Extraction(ExtractionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Extraction(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Extraction(ExtractionEvent::FileCompleted {
                succeeded: false, ..
            }) => EventSeverity::Warning,
            CoreEvent::Extraction(ExtractionEvent::BatchCompleted { failed, .. })
                if *failed > 0 =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Extraction(ExtractionEvent::FileCompleted { .. }) => EventSeverity::Debug,
            CoreEvent::Extraction(_) => EventSeverity::Info,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Extraction Events
// ============================================================================

/// Lifecycle of one `extract_all` batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ExtractionEvent {
    /// A batch was accepted.
    BatchStarted {
        batch_id: Uuid,
        /// Distinct paths in the batch.
        total: usize,
    },
    /// One path reached its final outcome.
    FileCompleted {
        batch_id: Uuid,
        path: PathBuf,
        succeeded: bool,
        /// Served from the result cache without running an extractor.
        from_cache: bool,
        completed: usize,
        total: usize,
        /// Whole-number progress, 0 through 100.
        percent: u8,
    },
    /// Every path in the batch has an outcome.
    BatchCompleted {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },
}

impl ExtractionEvent {
    pub fn description(&self) -> &str {
        match self {
            ExtractionEvent::BatchStarted { .. } => "Metadata batch started",
            ExtractionEvent::FileCompleted {
                succeeded: true, ..
            } => "File metadata extracted",
            ExtractionEvent::FileCompleted { .. } => "File metadata extraction failed",
            ExtractionEvent::BatchCompleted { .. } => "Metadata batch finished",
        }
    }

    pub fn batch_id(&self) -> Uuid {
        match self {
            ExtractionEvent::BatchStarted { batch_id, .. }
            | ExtractionEvent::FileCompleted { batch_id, .. }
            | ExtractionEvent::BatchCompleted { batch_id, .. } => *batch_id,
        }
    }
}

/// Integer progress percentage, clamped to 100.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall more than `capacity` events behind receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is listening.
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

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
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
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
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
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
