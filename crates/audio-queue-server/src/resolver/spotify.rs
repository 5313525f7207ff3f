//! Spotify page scraping and Web API playlist expansion.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::links::{self, SpotifyCollection};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.5672.126 Safari/537.36";

#[derive(Debug, Clone)]
pub(crate) struct SpotifyCredentials {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SpotifyError {
    #[error("spotify request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spotify page has no title")]
    MissingTitle,
    #[error("spotify credentials are not configured")]
    MissingCredentials,
    #[error("not a spotify collection link: {0}")]
    NotCollection(String),
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

pub(crate) struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<SpotifyCredentials>,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub(crate) fn new(credentials: Option<SpotifyCredentials>) -> Result<Self, SpotifyError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            credentials,
            token: tokio::sync::Mutex::new(None),
        })
    }

    /// Search query for a track link, built from the track page title.
    pub(crate) async fn track_query(&self, url: &str) -> Result<String, SpotifyError> {
        let page = self.fetch_page(&links::spotify_page_url(url)).await?;
        let title = links::html_title(&page).ok_or(SpotifyError::MissingTitle)?;
        Ok(links::rewrite_spotify_title(&title))
    }

    /// Track links of a playlist or album.
    ///
    /// Uses the Web API when credentials are configured and falls back to the
    /// public page's `music:song` tags otherwise.
    pub(crate) async fn collection_links(&self, url: &str) -> Result<Vec<String>, SpotifyError> {
        let (kind, id) =
            links::spotify_collection(url).ok_or_else(|| SpotifyError::NotCollection(url.to_string()))?;
        if self.credentials.is_some() {
            match self.api_collection_links(kind, &id).await {
                Ok(links) => return Ok(links),
                Err(err) => {
                    tracing::error!(error = %err, "spotify api failed; check client id and secret");
                }
            }
        }
        let page = self.fetch_page(&links::spotify_page_url(url)).await?;
        Ok(links::song_meta_links(&page))
    }

    async fn fetch_page(&self, url: &str) -> Result<String, SpotifyError> {
        let text = self.http.get(url).send().await?.error_for_status()?.text().await?;
        Ok(text)
    }

    async fn api_collection_links(
        &self,
        kind: SpotifyCollection,
        id: &str,
    ) -> Result<Vec<String>, SpotifyError> {
        let token = self.access_token().await?;
        let mut next = Some(match kind {
            SpotifyCollection::Album => format!("{API_BASE}/albums/{id}/tracks"),
            SpotifyCollection::Playlist => format!("{API_BASE}/playlists/{id}/tracks"),
        });
        let mut links = Vec::new();
        while let Some(url) = next.take() {
            let page: TracksPage = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            links.extend(page.items.iter().filter_map(item_link));
            next = page.next;
        }
        Ok(links)
    }

    async fn access_token(&self) -> Result<String, SpotifyError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.expires_at) {
            return Ok(token.value.clone());
        }
        let Some(credentials) = self.credentials.as_ref() else {
            return Err(SpotifyError::MissingCredentials);
        };
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // Refresh a minute early.
        let ttl = response.expires_in.unwrap_or(3600).saturating_sub(60);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        Ok(response.access_token)
    }
}

/// Playlist items wrap the track; album items are the track.
fn item_link(item: &Value) -> Option<String> {
    let track = item.get("track").filter(|t| !t.is_null()).unwrap_or(item);
    track
        .get("external_urls")?
        .get("spotify")?
        .as_str()
        .map(str::to_string)
}
