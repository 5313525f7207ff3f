//! Playback-related API handlers.

use actix_web::{HttpResponse, Responder, post, web};
use audio_queue_types::{LoopMode, LoopState, labels};

use crate::models::{LoopRequest, LoopResponse, PauseResponse, TransitionResponse, VolumeRequest, VolumeResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/sessions/{id}/skip",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Skipped", body = TransitionResponse),
        (status = 404, description = "Session not found"),
        (status = 503, description = "Output unavailable")
    )
)]
#[post("/sessions/{id}/skip")]
/// Skip the current entry, even in single-entry loop.
pub async fn skip(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.skip_forced().await {
        Ok(moved) => HttpResponse::Ok().json(TransitionResponse { moved }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/back",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Stepped back", body = TransitionResponse),
        (status = 404, description = "Session not found"),
        (status = 503, description = "Output unavailable")
    )
)]
#[post("/sessions/{id}/back")]
/// Return to the previous entry.
pub async fn back(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.back().await {
        Ok(moved) => HttpResponse::Ok().json(TransitionResponse { moved }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/pause",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Pause toggled", body = PauseResponse),
        (status = 404, description = "Session not found"),
        (status = 503, description = "Output unavailable")
    )
)]
#[post("/sessions/{id}/pause")]
/// Toggle pause/resume.
pub async fn pause_toggle(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.pause().await {
        Ok(result) => HttpResponse::Ok().json(PauseResponse {
            state: result,
            message: labels::pause_state(result).to_string(),
        }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/loop",
    params(("id" = String, Path, description = "Session id")),
    request_body = LoopRequest,
    responses(
        (status = 200, description = "Loop mode updated or rejected", body = LoopResponse),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/loop")]
/// Set the loop mode, or toggle between off and all when no mode is given.
pub async fn loop_mode(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: Option<web::Json<LoopRequest>>,
) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let requested = body.and_then(|b| b.into_inner().mode);
    let (result, mode) = match requested.as_deref().map(LoopMode::parse) {
        Some(None) => (LoopState::Invalid, session.queue_view().loop_mode),
        Some(Some(mode)) => session.set_loop_mode(Some(mode)),
        None => session.set_loop_mode(None),
    };
    HttpResponse::Ok().json(LoopResponse {
        state: result,
        mode,
        message: labels::loop_state(result).to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/stop",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Playback stopped"),
        (status = 404, description = "Session not found"),
        (status = 503, description = "Output unavailable")
    )
)]
#[post("/sessions/{id}/stop")]
/// Turn loop off, drop the queue and stop the output.
pub async fn stop(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.stop().await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/volume",
    params(("id" = String, Path, description = "Session id")),
    request_body = VolumeRequest,
    responses(
        (status = 200, description = "Volume set", body = VolumeResponse),
        (status = 400, description = "Volume out of range"),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/volume")]
/// Set the volume in percent.
pub async fn volume_set(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<VolumeRequest>,
) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.set_volume(body.value).await {
        Ok(volume) => HttpResponse::Ok().json(VolumeResponse { volume }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/volume/up",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Volume raised by one step", body = VolumeResponse),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/volume/up")]
pub async fn volume_up(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.volume_up().await {
        Ok(volume) => HttpResponse::Ok().json(VolumeResponse { volume }),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/volume/down",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Volume lowered by one step", body = VolumeResponse),
        (status = 404, description = "Session not found")
    )
)]
#[post("/sessions/{id}/volume/down")]
pub async fn volume_down(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    match session.volume_down().await {
        Ok(volume) => HttpResponse::Ok().json(VolumeResponse { volume }),
        Err(err) => err.into_response(),
    }
}
