//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::controller::{
    ControllerSettings, DEFAULT_IDLE_TIMEOUT, DEFAULT_PRELOAD_LOOKAHEAD, DEFAULT_VOLUME, MAX_PRELOAD_LOOKAHEAD,
};
use crate::links::LinkRules;
use crate::queue::{DEFAULT_MAX_HISTORY, DEFAULT_MAX_TITLE_HISTORY, QueueLimits};
use crate::resolver::ResolverSettings;
use crate::resolver::spotify::SpotifyCredentials;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_YTDLP: &str = "yt-dlp";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Queue and playback tuning.
    pub queue: Option<QueueConfig>,
    /// Extraction backend settings.
    pub resolver: Option<ResolverConfig>,
    /// Audio platform Web API credentials.
    pub spotify: Option<SpotifyConfig>,
    /// Bridge definitions; one playback session per bridge.
    pub bridges: Option<Vec<BridgeConfig>>,
    /// Bridge sink settings.
    pub sink: Option<SinkConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueConfig {
    /// Played entries kept for `back` (default: 10).
    pub max_history: Option<usize>,
    /// Played titles kept for the history listing (default: 15).
    pub max_title_history: Option<usize>,
    /// Entries kept resolved ahead, current included (default: 5, max: 25).
    pub preload_lookahead: Option<usize>,
    /// Initial volume percent (default: 100).
    pub default_volume: Option<u8>,
    /// Idle countdown in seconds; 0 disables it (default: 600).
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolverConfig {
    /// Path or name of the yt-dlp executable.
    pub ytdlp_path: Option<String>,
    /// Netscape cookie file passed to video platform lookups.
    pub cookie_file: Option<String>,
    /// File extensions played directly without extraction.
    pub supported_extensions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Bridge config from TOML.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Stable bridge id, also used as the session id.
    pub id: String,
    /// Display name (defaults to id).
    pub name: Option<String>,
    /// Bridge HTTP address (host:port).
    pub http_addr: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SinkConfig {
    /// Bridge status poll interval in milliseconds (default: 500).
    pub poll_interval_ms: Option<u64>,
}

/// Resolved bridge config with parsed socket address.
#[derive(Debug, Clone)]
pub struct BridgeConfigResolved {
    pub id: String,
    pub name: String,
    pub http_addr: SocketAddr,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse the bind address, falling back to the default.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<SocketAddr> {
    let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    bind.parse().with_context(|| format!("parse bind {bind}"))
}

/// Resolve bridge configs and parse their addresses.
pub fn bridges_from_config(cfg: &ServerConfig) -> Result<Vec<BridgeConfigResolved>> {
    let mut bridges: Vec<BridgeConfigResolved> = Vec::new();
    for bridge in cfg.bridges.iter().flatten() {
        let id = bridge.id.trim();
        if id.is_empty() {
            anyhow::bail!("bridge id must not be empty");
        }
        if bridges.iter().any(|b| b.id == id) {
            anyhow::bail!("duplicate bridge id {id}");
        }
        let http_addr: SocketAddr = bridge
            .http_addr
            .parse()
            .with_context(|| format!("parse bridge http_addr {}", bridge.http_addr))?;
        bridges.push(BridgeConfigResolved {
            id: id.to_string(),
            name: bridge.name.clone().unwrap_or_else(|| id.to_string()),
            http_addr,
        });
    }
    Ok(bridges)
}

/// Per-session controller settings with defaults applied.
pub(crate) fn controller_settings_from_config(cfg: &ServerConfig) -> ControllerSettings {
    let queue = cfg.queue.as_ref();
    let requested = queue
        .and_then(|q| q.preload_lookahead)
        .unwrap_or(DEFAULT_PRELOAD_LOOKAHEAD);
    if requested > MAX_PRELOAD_LOOKAHEAD {
        tracing::warn!(requested, max = MAX_PRELOAD_LOOKAHEAD, "preload_lookahead capped");
    }
    ControllerSettings {
        limits: QueueLimits {
            max_history: queue.and_then(|q| q.max_history).unwrap_or(DEFAULT_MAX_HISTORY),
            max_title_history: queue
                .and_then(|q| q.max_title_history)
                .unwrap_or(DEFAULT_MAX_TITLE_HISTORY),
        },
        preload_lookahead: requested.clamp(1, MAX_PRELOAD_LOOKAHEAD),
        default_volume: queue.and_then(|q| q.default_volume).unwrap_or(DEFAULT_VOLUME).min(100),
        idle_timeout: queue
            .and_then(|q| q.idle_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT),
    }
}

pub(crate) fn resolver_settings_from_config(cfg: &ServerConfig) -> ResolverSettings {
    let resolver = cfg.resolver.as_ref();
    let cookie_file = resolver
        .and_then(|r| r.cookie_file.as_deref())
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);
    let link_rules = match resolver.and_then(|r| r.supported_extensions.clone()) {
        Some(extensions) => LinkRules::new(extensions),
        None => LinkRules::default(),
    };
    ResolverSettings { cookie_file, link_rules }
}

pub fn ytdlp_path_from_config(cfg: &ServerConfig) -> PathBuf {
    PathBuf::from(
        cfg.resolver
            .as_ref()
            .and_then(|r| r.ytdlp_path.as_deref())
            .unwrap_or(DEFAULT_YTDLP),
    )
}

/// Web API credentials; `SPOTIFY_ID`/`SPOTIFY_SECRET` override the file.
pub(crate) fn spotify_credentials_from_config(cfg: &ServerConfig) -> Option<SpotifyCredentials> {
    spotify_credentials_with_env(cfg, |key| std::env::var(key).ok())
}

fn spotify_credentials_with_env(
    cfg: &ServerConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<SpotifyCredentials> {
    let file = cfg.spotify.as_ref();
    let pick = |key: &str, from_file: Option<&String>| {
        env(key)
            .or_else(|| from_file.cloned())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let client_id = pick("SPOTIFY_ID", file.and_then(|s| s.client_id.as_ref()))?;
    let client_secret = pick("SPOTIFY_SECRET", file.and_then(|s| s.client_secret.as_ref()))?;
    Some(SpotifyCredentials {
        client_id,
        client_secret,
    })
}

pub fn poll_interval_from_config(cfg: &ServerConfig) -> Duration {
    let ms = cfg
        .sink
        .as_ref()
        .and_then(|s| s.poll_interval_ms)
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    Duration::from_millis(ms)
}
