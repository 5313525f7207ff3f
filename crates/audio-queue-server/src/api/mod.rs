//! HTTP API handlers.
//!
//! Defines the Actix routes for session queues, playback control and events.

pub mod health;
pub mod playback;
pub mod queue;
pub mod sessions;
pub mod streams;

pub use playback::{back, loop_mode, pause_toggle, skip, stop, volume_down, volume_set, volume_up};
pub use queue::{queue_clear, queue_get, queue_move, queue_remove, queue_shuffle, queue_submit, history_get};
pub use sessions::sessions_list;
pub use streams::events_stream;

/// Register every API route on an app.
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(health::health)
        .service(sessions_list)
        .service(events_stream)
        .service(queue_get)
        .service(history_get)
        .service(queue_submit)
        .service(queue_remove)
        .service(queue_move)
        .service(queue_shuffle)
        .service(queue_clear)
        .service(skip)
        .service(back)
        .service(pause_toggle)
        .service(loop_mode)
        .service(stop)
        .service(volume_set)
        .service(volume_up)
        .service(volume_down);
}
