//! In-process event bus for session updates.
//!
//! Provides a lightweight broadcast channel that transports (chat bots, UIs)
//! subscribe to.

use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

/// Session event payloads published by the controllers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    QueueChanged { session: String },
    NowPlaying {
        session: String,
        title: String,
        url: String,
    },
    /// An entry could not be made playable and was dropped.
    EntryDropped {
        session: String,
        title: String,
        url: String,
    },
    /// The idle countdown fired; the transport may disconnect.
    IdleTimeout { session: String },
    Stopped { session: String },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::trace!(?event, "session event");
        let _ = self.sender.send(event);
    }

    /// Notify subscribers that a session queue has changed.
    pub fn queue_changed(&self, session: &str) {
        self.publish(SessionEvent::QueueChanged {
            session: session.to_string(),
        });
    }
}
