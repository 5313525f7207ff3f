//! Display strings for command results.
//!
//! Control flow only ever matches on the enums; these tables are the single
//! place where user-facing text lives.

use crate::{LoopState, PauseState, SourceKind};

pub fn loop_state(state: LoopState) -> &'static str {
    match state {
        LoopState::Enabled => "Loop enabled :arrows_counterclockwise:",
        LoopState::Disabled => "Loop disabled :x:",
        LoopState::Invalid => "Invalid loop mode!",
    }
}

pub fn pause_state(state: PauseState) -> &'static str {
    match state {
        PauseState::Paused => "Playback Paused :pause_button:",
        PauseState::Resumed => "Resumed playback :arrow_forward:",
        PauseState::NothingToPause => "Nothing to pause or resume.",
    }
}

pub fn source_kind(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::WebVideo => "YouTube",
        SourceKind::AudioPlatformTrack => "Spotify",
        SourceKind::AudioPlatformPlaylistExpansion => "Spotify Playlist",
        SourceKind::DirectFile => "Custom",
        SourceKind::OtherPlatform => "Other",
        SourceKind::Unknown => "Unknown",
    }
}

pub const NEGATIVE_INDEX: &str = "Song position can't be negative.";
pub const ZERO_INDEX: &str = "Can't touch the currently playing song.";
pub const MISSING_INDEX: &str = "There is no song at that position.";
pub const UNSUPPORTED_REFERENCE: &str = "Unsupported site or no results found.";
pub const RESOLUTION_FAILED: &str = "Error while loading the song.";
pub const PLAYLIST_QUEUED: &str = "Queued playlist :page_with_curl:";
pub const SESSION_NOT_FOUND: &str = "Unknown playback session.";
pub const VOLUME_OUT_OF_RANGE: &str = "Volume must be between 0 and 100.";
pub const UNKNOWN_TITLE: &str = "Unknown";
pub const HISTORY_TITLE: &str = "Played tracks:";
