//! Registry of playback sessions, one per configured bridge.

use std::sync::Arc;

use crate::controller::{CommandError, ControllerSettings, PlaybackController};
use crate::events::EventBus;
use crate::models::SessionSummary;
use crate::playback_sink::PlaybackSink;
use crate::resolver::Resolver;

struct Session {
    name: String,
    controller: PlaybackController,
}

/// Sessions are created at startup and live for the whole process.
pub(crate) struct SessionRegistry {
    sessions: Vec<Session>,
    events: EventBus,
}

impl SessionRegistry {
    pub(crate) fn new(events: EventBus) -> Self {
        Self {
            sessions: Vec::new(),
            events,
        }
    }

    /// Register a session that plays through `sink`. Ids must be unique.
    pub(crate) fn add(
        &mut self,
        id: &str,
        name: &str,
        resolver: Resolver,
        sink: Arc<dyn PlaybackSink>,
        settings: ControllerSettings,
    ) -> anyhow::Result<()> {
        if self.sessions.iter().any(|s| s.controller.session_id() == id) {
            anyhow::bail!("duplicate session id {id}");
        }
        let controller = PlaybackController::new(id, resolver, sink, self.events.clone(), settings);
        tracing::info!(session = %id, name = %name, "session registered");
        self.sessions.push(Session {
            name: name.to_string(),
            controller,
        });
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Result<&PlaybackController, CommandError> {
        self.sessions
            .iter()
            .find(|s| s.controller.session_id() == id)
            .map(|s| &s.controller)
            .ok_or_else(|| CommandError::SessionNotFound(id.to_string()))
    }

    pub(crate) fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| SessionSummary {
                id: s.controller.session_id().to_string(),
                name: s.name.clone(),
                state: s.controller.player_state(),
                queued: s.controller.queued(),
            })
            .collect()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Stop every session; used on shutdown.
    pub(crate) async fn shutdown(&self) {
        for session in &self.sessions {
            if let Err(err) = session.controller.stop().await {
                tracing::warn!(session = %session.controller.session_id(), error = %err, "stop on shutdown failed");
            }
        }
    }
}
