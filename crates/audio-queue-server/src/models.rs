//! API models and OpenAPI schemas.
//!
//! Defines request/response structures for the queue server API.

use audio_queue_types::{LoopMode, LoopState, Origin, PauseState, PlayerState, SourceKind, labels};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::descriptor::MediaDescriptor;

/// A queued entry as shown to users.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct EntryView {
    /// Process-unique descriptor id.
    pub id: u64,
    /// Title, or the page URL without its scheme when unknown.
    pub title: String,
    /// Page URL for the entry.
    pub url: String,
    pub uploader: Option<String>,
    /// Duration in seconds, if known.
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
    /// How the entry entered the queue.
    pub origin: Origin,
    /// Platform family of the entry.
    pub source_kind: SourceKind,
    /// Display label for `source_kind`.
    pub source: String,
}

impl EntryView {
    pub fn from_descriptor(descriptor: &MediaDescriptor) -> Self {
        let resolved = descriptor.resolved();
        Self {
            id: descriptor.id(),
            title: descriptor.display_title(),
            url: resolved
                .display_url
                .clone()
                .unwrap_or_else(|| descriptor.reference_url().to_string()),
            uploader: resolved.uploader,
            duration_secs: resolved.duration_secs,
            thumbnail: resolved.thumbnail,
            origin: descriptor.origin(),
            source_kind: descriptor.source_kind(),
            source: labels::source_kind(descriptor.source_kind()).to_string(),
        }
    }
}

/// Queue snapshot for one session.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueResponse {
    /// Session id.
    pub session: String,
    /// Coarse playback state.
    pub state: PlayerState,
    /// Entry currently playing or paused.
    pub now_playing: Option<EntryView>,
    /// Entries after the current one, limited to the preload window.
    pub upcoming: Vec<EntryView>,
    /// Total pending entries, current one included.
    pub total: usize,
    pub loop_mode: LoopMode,
    pub has_next: bool,
    pub has_prev: bool,
    /// Volume percent.
    pub volume: u8,
}

/// Titles of finished entries, oldest first.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    /// Heading for display.
    pub title: String,
    pub tracks: Vec<String>,
}

/// Request payload for `/sessions/{id}/submit`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// Search text, page link or playlist link.
    pub reference: String,
}

/// Result of a submit command.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    /// User-facing summary.
    pub message: String,
    /// The queued entry for single references.
    pub entry: Option<EntryView>,
    /// Number of entries added.
    pub queued: usize,
}

/// Request payload for `/sessions/{id}/loop`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct LoopRequest {
    /// `off`, `all` or `single`; omitted toggles between off and all.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoopResponse {
    pub state: LoopState,
    /// Mode in effect after the command.
    pub mode: LoopMode,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PauseResponse {
    pub state: PauseState,
    pub message: String,
}

/// Request payload for `/sessions/{id}/remove`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RemoveRequest {
    /// Queue position (1 = next up).
    pub index: i64,
}

/// Request payload for `/sessions/{id}/move`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MoveRequest {
    pub from: i64,
    pub to: i64,
}

/// Entry affected by a remove or move command.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryResponse {
    pub entry: EntryView,
}

/// Request payload for `/sessions/{id}/volume`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VolumeRequest {
    /// Volume percent (0-100).
    pub value: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VolumeResponse {
    pub volume: u8,
}

/// Result of a skip or back command.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionResponse {
    /// `false` when there was nothing to move to.
    pub moved: bool,
}

/// A configured playback session.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub state: PlayerState,
    /// Pending entries, current one included.
    pub queued: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Error body returned by command endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
