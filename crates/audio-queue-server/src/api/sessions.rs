//! Session listing.

use actix_web::{HttpResponse, Responder, get, web};

use crate::models::SessionsResponse;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Configured sessions", body = SessionsResponse)
    )
)]
#[get("/sessions")]
/// List configured sessions and their playback state.
pub async fn sessions_list(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(SessionsResponse {
        sessions: state.sessions.list(),
    })
}
