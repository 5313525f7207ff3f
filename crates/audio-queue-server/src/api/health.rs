use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Short git sha of the build.
    pub version: &'static str,
    pub build_date: &'static str,
    /// Configured playback sessions.
    pub sessions: usize,
    pub uptime_secs: u64,
}

/// Basic health check for clients and monitoring.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Queue server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("GIT_SHA"),
        build_date: env!("BUILD_DATE"),
        sessions: state.sessions.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
