//! Reference classification and URL helpers.

use std::sync::LazyLock;

use audio_queue_types::SourceKind;
use regex::Regex;
use scraper::{Html, Selector};

pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] =
    &[".webm", ".mp4", ".mp3", ".avi", ".wav", ".m4v", ".ogg", ".mov"];

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("url regex"));
static SPOTIFY_TRACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://open\.spotify\.com/([^/]+/)?track").expect("track regex"));
static SPOTIFY_ALBUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://open\.spotify\.com/([^/]+/)?album").expect("album regex"));
static SPOTIFY_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.*) - song( and lyrics)? by (.*) \| Spotify").expect("title regex")
});

/// Single-item link families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Youtube,
    SpotifyTrack,
    SpotifyCollection,
    BandcampTrack,
    Twitter,
    DirectFile,
    Soundcloud,
    Unknown,
}

impl LinkKind {
    pub fn source_kind(self) -> SourceKind {
        match self {
            LinkKind::Youtube => SourceKind::WebVideo,
            LinkKind::SpotifyTrack => SourceKind::AudioPlatformTrack,
            LinkKind::SpotifyCollection => SourceKind::AudioPlatformPlaylistExpansion,
            LinkKind::BandcampTrack | LinkKind::Twitter | LinkKind::Soundcloud => {
                SourceKind::OtherPlatform
            }
            LinkKind::DirectFile => SourceKind::DirectFile,
            LinkKind::Unknown => SourceKind::Unknown,
        }
    }
}

/// Collection links that expand into several entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Youtube,
    Spotify,
    Bandcamp,
}

/// Spotify collection flavour, which selects the Web API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyCollection {
    Album,
    Playlist,
}

#[derive(Debug, Clone)]
pub struct LinkRules {
    supported_extensions: Vec<String>,
}

impl Default for LinkRules {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_EXTENSIONS.iter().map(|ext| ext.to_string()))
    }
}

impl LinkRules {
    pub fn new(extensions: impl IntoIterator<Item = String>) -> Self {
        let supported_extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.trim().to_ascii_lowercase();
                if ext.starts_with('.') { ext } else { format!(".{ext}") }
            })
            .filter(|ext| ext.len() > 1)
            .collect();
        Self {
            supported_extensions,
        }
    }

    /// Classify a reference that is not a collection. First match wins.
    pub fn classify(&self, reference: &str) -> LinkKind {
        if reference.contains("https://www.youtu") || reference.contains("https://youtu.be") {
            return LinkKind::Youtube;
        }
        if SPOTIFY_TRACK_RE.is_match(reference) {
            return LinkKind::SpotifyTrack;
        }
        if is_spotify_collection(reference) {
            return LinkKind::SpotifyCollection;
        }
        if reference.contains("bandcamp.com/track/") {
            return LinkKind::BandcampTrack;
        }
        if reference.contains("https://twitter.com/") {
            return LinkKind::Twitter;
        }
        if self.is_direct_file(reference) {
            return LinkKind::DirectFile;
        }
        if reference.contains("soundcloud.com/") {
            return LinkKind::Soundcloud;
        }
        LinkKind::Unknown
    }

    pub fn is_direct_file(&self, reference: &str) -> bool {
        let lower = reference.to_ascii_lowercase();
        self.supported_extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }
}

pub fn playlist_kind(reference: &str) -> Option<PlaylistKind> {
    if reference.contains("playlist?list=") {
        return Some(PlaylistKind::Youtube);
    }
    if is_spotify_collection(reference) {
        return Some(PlaylistKind::Spotify);
    }
    if reference.contains("bandcamp.com/album/") {
        return Some(PlaylistKind::Bandcamp);
    }
    None
}

fn is_spotify_collection(reference: &str) -> bool {
    reference.contains("https://open.spotify.com/playlist") || SPOTIFY_ALBUM_RE.is_match(reference)
}

/// Split a Spotify collection link into its flavour and id.
pub fn spotify_collection(url: &str) -> Option<(SpotifyCollection, String)> {
    let kind = if SPOTIFY_ALBUM_RE.is_match(url) {
        SpotifyCollection::Album
    } else if url.contains("open.spotify.com/playlist") {
        SpotifyCollection::Playlist
    } else {
        return None;
    };
    let parsed = reqwest::Url::parse(url).ok()?;
    let id = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?.to_string();
    Some((kind, id))
}

pub fn contains_url(text: &str) -> bool {
    URL_RE.is_match(text)
}

/// Drop the `&list=` continuation so a watch link resolves to one video.
pub fn strip_playlist_continuation(url: &str) -> &str {
    url.split("&list=").next().unwrap_or(url)
}

/// Page URL to fetch for a Spotify share link.
pub fn spotify_page_url(url: &str) -> String {
    if url.contains("?si=") {
        let base = URL_RE.find(url).map(|m| m.as_str()).unwrap_or(url);
        format!("{base}&nd=1")
    } else {
        url.to_string()
    }
}

/// Turn a Spotify page title into a search query ("Song Artist").
pub fn rewrite_spotify_title(title: &str) -> String {
    SPOTIFY_TITLE_RE.replace(title, "$1 $3").into_owned()
}

/// Title of a direct file link: its last path segment.
pub fn file_title(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

pub fn html_title(page: &str) -> Option<String> {
    let document = Html::parse_document(page);
    let selector = Selector::parse("title").ok()?;
    let title: String = document.select(&selector).next()?.text().collect();
    let title = title.trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

/// `content` of every `<meta name="music:song">` tag on the page.
pub fn song_meta_links(page: &str) -> Vec<String> {
    let document = Html::parse_document(page);
    let Ok(selector) = Selector::parse(r#"meta[name="music:song"][content]"#) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(str::to_string)
        .collect()
}
