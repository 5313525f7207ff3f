use serde::{Deserialize, Serialize};

pub mod labels;

/// Queue advance policy.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Played entries move to history.
    #[default]
    Off,
    /// Played entries rotate to the back of the queue.
    All,
    /// The current entry repeats until explicitly skipped.
    Single,
}

impl LoopMode {
    /// Stable wire name, also accepted by [`LoopMode::parse`].
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::All => "all",
            LoopMode::Single => "single",
        }
    }

    /// Parse a user-supplied mode name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(LoopMode::Off),
            "all" => Some(LoopMode::All),
            "single" => Some(LoopMode::Single),
            _ => None,
        }
    }
}

/// Result of a loop mode command.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Enabled,
    Disabled,
    Invalid,
}

/// Result of a pause/resume toggle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PauseState {
    Paused,
    Resumed,
    NothingToPause,
}

/// Coarse playback state of a session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// How an entry entered the queue.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Queued directly from a single reference.
    Direct,
    /// Expanded from a playlist or album reference.
    FromPlaylist,
}

/// Platform family of a reference, which selects its resolution strategy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Video platform page, resolved through the extraction backend.
    WebVideo,
    /// Audio platform track, resolved by searching its title on the video platform.
    AudioPlatformTrack,
    /// Audio platform playlist or album, expanded into tracks.
    AudioPlatformPlaylistExpansion,
    /// Direct link to a media file, played as-is.
    DirectFile,
    /// Other page the extraction backend understands (album stores, social posts).
    OtherPlatform,
    Unknown,
}

impl SourceKind {
    /// Kinds whose stream handles carry an expiry that must be revalidated.
    pub fn has_expiring_streams(&self) -> bool {
        matches!(self, SourceKind::WebVideo | SourceKind::AudioPlatformTrack)
    }
}

/// Status snapshot reported by an audio bridge on `GET /status`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BridgeStatus {
    /// URL of the stream being played, if any.
    #[serde(default)]
    pub now_playing: Option<String>,
    /// `true` when playback is paused or idle.
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Volume in percent as applied by the bridge.
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_mode_parse_is_case_insensitive() {
        assert_eq!(LoopMode::parse(" ALL "), Some(LoopMode::All));
        assert_eq!(LoopMode::parse("single"), Some(LoopMode::Single));
        assert_eq!(LoopMode::parse("sometimes"), None);
    }

    #[test]
    fn loop_mode_round_trips_through_as_str() {
        for mode in [LoopMode::Off, LoopMode::All, LoopMode::Single] {
            assert_eq!(LoopMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn only_platform_streams_expire() {
        assert!(SourceKind::WebVideo.has_expiring_streams());
        assert!(SourceKind::AudioPlatformTrack.has_expiring_streams());
        assert!(!SourceKind::DirectFile.has_expiring_streams());
        assert!(!SourceKind::OtherPlatform.has_expiring_streams());
    }
}
