use utoipa::OpenApi;

use crate::api;
use crate::events;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        api::sessions::sessions_list,
        api::streams::events_stream,
        api::queue::queue_get,
        api::queue::history_get,
        api::queue::queue_submit,
        api::queue::queue_remove,
        api::queue::queue_move,
        api::queue::queue_shuffle,
        api::queue::queue_clear,
        api::playback::skip,
        api::playback::back,
        api::playback::pause_toggle,
        api::playback::loop_mode,
        api::playback::stop,
        api::playback::volume_set,
        api::playback::volume_up,
        api::playback::volume_down,
    ),
    components(
        schemas(
            api::health::HealthResponse,
            events::SessionEvent,
            models::EntryView,
            models::QueueResponse,
            models::HistoryResponse,
            models::SubmitRequest,
            models::SubmitResponse,
            models::LoopRequest,
            models::LoopResponse,
            models::PauseResponse,
            models::RemoveRequest,
            models::MoveRequest,
            models::EntryResponse,
            models::VolumeRequest,
            models::VolumeResponse,
            models::TransitionResponse,
            models::SessionSummary,
            models::SessionsResponse,
            models::ErrorResponse,
            audio_queue_types::LoopMode,
            audio_queue_types::LoopState,
            audio_queue_types::PauseState,
            audio_queue_types::PlayerState,
            audio_queue_types::Origin,
            audio_queue_types::SourceKind,
        )
    ),
    tags(
        (name = "audio-queue-server", description = "Playback queue control API")
    )
)]
pub struct ApiDoc;
