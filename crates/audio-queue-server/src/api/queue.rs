//! Queue-related API handlers.

use actix_web::{HttpResponse, Responder, get, post, web};
use audio_queue_types::labels;

use crate::controller::Submitted;
use crate::models::{
    EntryResponse, EntryView, HistoryResponse, MoveRequest, QueueResponse, RemoveRequest, SubmitRequest,
    SubmitResponse,
};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/sessions/{id}/queue",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Queue contents", body = QueueResponse),
        (status = 404, description = "Session not found")
    )
)]
#[get("/sessions/{id}/queue")]
/// Return the current entry and the upcoming window.
pub async fn queue_get(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match state.sessions.get(&id) {
        Ok(session) => HttpResponse::Ok().json(session.queue_view()),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/history",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Played titles", body = HistoryResponse),
        (status = 404, description = "Session not found")
    )
)]
#[get("/sessions/{id}/history")]
/// Return the titles of recently finished entries.
pub async fn history_get(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match state.sessions.get(&id) {
        Ok(session) => HttpResponse::Ok().json(HistoryResponse {
            title: labels::HISTORY_TITLE.to_string(),
            tracks: session.track_history(),
        }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/submit",
    params(("id" = String, Path, description = "Session id")),
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Reference queued or unsupported", body = SubmitResponse),
        (status = 404, description = "Session not found"),
        (status = 502, description = "Resolution failed")
    )
)]
#[post("/sessions/{id}/submit")]
/// Resolve a reference and queue the result.
pub async fn queue_submit(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<SubmitRequest>,
) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let response = match session.submit(&body.reference).await {
        Ok(Some(Submitted::Track(descriptor))) => SubmitResponse {
            message: descriptor.display_title(),
            entry: Some(EntryView::from_descriptor(&descriptor)),
            queued: 1,
        },
        Ok(Some(Submitted::Playlist { count })) => SubmitResponse {
            message: labels::PLAYLIST_QUEUED.to_string(),
            entry: None,
            queued: count,
        },
        Ok(None) => SubmitResponse {
            message: labels::UNSUPPORTED_REFERENCE.to_string(),
            entry: None,
            queued: 0,
        },
        Err(err) => return err.into_response(),
    };
    HttpResponse::Ok().json(response)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/remove",
    params(("id" = String, Path, description = "Session id")),
    request_body = RemoveRequest,
    responses(
        (status = 200, description = "Entry removed", body = EntryResponse),
        (status = 400, description = "Bad position"),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/remove")]
/// Remove the entry at a queue position.
pub async fn queue_remove(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<RemoveRequest>,
) -> impl Responder {
    let result = state.sessions.get(&id).and_then(|session| session.remove(body.index));
    match result {
        Ok(entry) => HttpResponse::Ok().json(EntryResponse {
            entry: EntryView::from_descriptor(&entry),
        }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/move",
    params(("id" = String, Path, description = "Session id")),
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Entry moved", body = EntryResponse),
        (status = 400, description = "Bad position"),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/move")]
/// Move an entry to another queue position.
pub async fn queue_move(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<MoveRequest>,
) -> impl Responder {
    let result = state
        .sessions
        .get(&id)
        .and_then(|session| session.move_entry(body.from, body.to));
    match result {
        Ok(entry) => HttpResponse::Ok().json(EntryResponse {
            entry: EntryView::from_descriptor(&entry),
        }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/shuffle",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Queue shuffled", body = QueueResponse),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/shuffle")]
/// Shuffle everything after the current entry.
pub async fn queue_shuffle(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match state.sessions.get(&id) {
        Ok(session) => {
            session.shuffle();
            HttpResponse::Ok().json(session.queue_view())
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/clear",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Queue cleared", body = QueueResponse),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/clear")]
/// Drop everything after the current entry.
pub async fn queue_clear(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match state.sessions.get(&id) {
        Ok(session) => {
            session.clear();
            HttpResponse::Ok().json(session.queue_view())
        }
        Err(err) => err.into_response(),
    }
}
