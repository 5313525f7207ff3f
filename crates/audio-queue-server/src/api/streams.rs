//! Server-sent event stream of session events.

use std::collections::VecDeque;
use std::time::Instant;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse, Responder, get, web};
use futures_util::stream::unfold;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, Interval, MissedTickBehavior};
use utoipa::IntoParams;

use crate::events::SessionEvent;
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Only forward events for this session.
    pub session: Option<String>,
}

struct EventStreamState {
    receiver: broadcast::Receiver<SessionEvent>,
    session: Option<String>,
    interval: Interval,
    pending: VecDeque<Bytes>,
    last_ping: Instant,
}

fn sse_event(event: &str, data: &str) -> Bytes {
    let mut payload = String::new();
    payload.push_str("event: ");
    payload.push_str(event);
    payload.push('\n');
    for line in data.lines() {
        payload.push_str("data: ");
        payload.push_str(line);
        payload.push('\n');
    }
    payload.push('\n');
    Bytes::from(payload)
}

fn event_session(event: &SessionEvent) -> &str {
    match event {
        SessionEvent::QueueChanged { session }
        | SessionEvent::NowPlaying { session, .. }
        | SessionEvent::EntryDropped { session, .. }
        | SessionEvent::IdleTimeout { session }
        | SessionEvent::Stopped { session } => session,
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::QueueChanged { .. } => "queue_changed",
        SessionEvent::NowPlaying { .. } => "now_playing",
        SessionEvent::EntryDropped { .. } => "entry_dropped",
        SessionEvent::IdleTimeout { .. } => "idle_timeout",
        SessionEvent::Stopped { .. } => "stopped",
    }
}

#[utoipa::path(
    get,
    path = "/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Session event stream")
    )
)]
#[get("/events")]
/// Stream session events via server-sent events.
pub async fn events_stream(state: web::Data<AppState>, query: web::Query<EventsQuery>) -> impl Responder {
    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let stream = unfold(
        EventStreamState {
            receiver: state.events().subscribe(),
            session: query.into_inner().session,
            interval,
            pending: VecDeque::new(),
            last_ping: Instant::now(),
        },
        |mut ctx| async move {
            loop {
                if let Some(bytes) = ctx.pending.pop_front() {
                    return Some((Ok::<Bytes, Error>(bytes), ctx));
                }
                tokio::select! {
                    _ = ctx.interval.tick() => {}
                    result = ctx.receiver.recv() => match result {
                        Ok(event) => {
                            let wanted = ctx.session.as_deref().is_none_or(|id| id == event_session(&event));
                            if wanted {
                                let json = serde_json::to_string(&event).unwrap_or_else(|_| "null".to_string());
                                ctx.pending.push_back(sse_event(event_name(&event), &json));
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "event stream lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    },
                }
                if ctx.pending.is_empty() && ctx.last_ping.elapsed() >= PING_INTERVAL {
                    ctx.last_ping = Instant::now();
                    ctx.pending.push_back(Bytes::from(": ping\n\n"));
                }
            }
        },
    );

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}
