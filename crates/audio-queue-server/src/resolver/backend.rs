//! Extraction backend seam and the per-options client cache.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Deserialize;

/// Options a backend client is built with. Equal options share one client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct ExtractOptions {
    pub(crate) format: Option<String>,
    pub(crate) flat_playlist: bool,
    pub(crate) no_playlist: bool,
    pub(crate) default_search: Option<String>,
    pub(crate) cookie_file: Option<PathBuf>,
}

impl ExtractOptions {
    /// Single item, best audio stream.
    pub(crate) fn best_audio(cookie_file: Option<PathBuf>) -> Self {
        Self {
            format: Some("bestaudio".to_string()),
            cookie_file,
            ..Self::default()
        }
    }

    /// Single item, any stream.
    pub(crate) fn any_format(cookie_file: Option<PathBuf>) -> Self {
        Self {
            cookie_file,
            ..Self::default()
        }
    }

    pub(crate) fn search(cookie_file: Option<PathBuf>) -> Self {
        Self {
            format: Some("bestaudio/best".to_string()),
            no_playlist: true,
            default_search: Some("auto".to_string()),
            cookie_file,
            ..Self::default()
        }
    }

    /// Playlist listing without resolving members.
    pub(crate) fn flat_playlist(cookie_file: Option<PathBuf>) -> Self {
        Self {
            format: Some("bestaudio/best".to_string()),
            flat_playlist: true,
            cookie_file,
            ..Self::default()
        }
    }
}

/// Metadata returned by the backend. Unknown fields are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub(crate) struct ExtractedInfo {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) uploader: Option<String>,
    #[serde(default)]
    pub(crate) webpage_url: Option<String>,
    /// Stream URL for single items; page URL for flat playlist entries.
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) duration: Option<f64>,
    #[serde(default)]
    pub(crate) thumbnail: Option<String>,
    #[serde(default)]
    pub(crate) entries: Option<Vec<ExtractedInfo>>,
}

impl ExtractedInfo {
    pub(crate) fn first_entry(self) -> Option<ExtractedInfo> {
        self.entries.and_then(|entries| entries.into_iter().next())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ExtractError {
    /// Known "no result" outcome (unsupported site, removed video).
    #[error("expected extraction failure: {0}")]
    Expected(String),
    #[error("extraction failed: {0}")]
    Unexpected(String),
}

/// A configured backend client. Calls block and only run on the resolver worker.
pub(crate) trait ExtractClient: Send + Sync {
    fn extract(&self, reference: &str) -> Result<ExtractedInfo, ExtractError>;
}

pub(crate) trait ExtractBackend: Send + Sync {
    fn client(&self, options: &ExtractOptions) -> Arc<dyn ExtractClient>;

    /// Cheap call used to warm the worker at startup.
    fn probe(&self) -> Result<String, ExtractError>;
}

/// Append-only cache of backend clients keyed by their options.
#[derive(Default)]
pub(crate) struct ClientCache {
    entries: Mutex<Vec<(ExtractOptions, Arc<dyn ExtractClient>)>>,
}

impl ClientCache {
    pub(crate) fn get_or_create(
        &self,
        backend: &dyn ExtractBackend,
        options: &ExtractOptions,
    ) -> Arc<dyn ExtractClient> {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        if let Some((_, client)) = entries.iter().find(|(cached, _)| cached == options) {
            return client.clone();
        }
        let client = backend.client(options);
        entries.push((options.clone(), client.clone()));
        client
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|err| err.into_inner()).len()
    }
}
