//! Shared application state.

use std::time::Instant;

use crate::events::EventBus;
use crate::sessions::SessionRegistry;

pub struct AppState {
    pub(crate) sessions: SessionRegistry,
    pub(crate) started_at: Instant,
}

impl AppState {
    pub(crate) fn new(sessions: SessionRegistry) -> Self {
        Self {
            sessions,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn events(&self) -> &EventBus {
        self.sessions.events()
    }
}
