//! Media descriptors shared between the queue and the resolver.
//!
//! A descriptor's identity (id, origin, kind, reference URL) is fixed at
//! creation. Everything learned from the extraction backend lives in
//! [`ResolvedInfo`] and is swapped wholesale on each resolution pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use audio_queue_types::{Origin, SourceKind};

pub type DescriptorId = u64;
pub type SharedDescriptor = Arc<MediaDescriptor>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Metadata filled in by a resolution pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Page URL shown to users (may differ from the reference, e.g. search hits).
    pub display_url: Option<String>,
    /// Playable, possibly time-limited stream URL.
    pub stream_url: Option<String>,
    /// Expiry embedded in `stream_url`, if the platform provides one.
    pub stream_expiry: Option<SystemTime>,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
}

impl ResolvedInfo {
    /// Build resolved info for a stream URL, deriving the expiry from it.
    pub fn with_stream(stream_url: Option<String>) -> Self {
        let stream_expiry = stream_url.as_deref().and_then(parse_stream_expiry);
        Self {
            stream_url,
            stream_expiry,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct MediaDescriptor {
    id: DescriptorId,
    origin: Origin,
    source_kind: SourceKind,
    reference_url: String,
    resolved: RwLock<ResolvedInfo>,
}

impl MediaDescriptor {
    /// Create an unresolved descriptor.
    pub fn new(origin: Origin, source_kind: SourceKind, reference_url: impl Into<String>) -> SharedDescriptor {
        Self::with_resolved(origin, source_kind, reference_url, ResolvedInfo::default())
    }

    /// Create a descriptor that already carries resolved metadata.
    pub fn with_resolved(
        origin: Origin,
        source_kind: SourceKind,
        reference_url: impl Into<String>,
        resolved: ResolvedInfo,
    ) -> SharedDescriptor {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            origin,
            source_kind,
            reference_url: reference_url.into(),
            resolved: RwLock::new(resolved),
        })
    }

    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn reference_url(&self) -> &str {
        &self.reference_url
    }

    /// Snapshot of the resolved fields.
    pub fn resolved(&self) -> ResolvedInfo {
        self.resolved
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Overwrite every resolved field with the result of a new pass.
    pub fn replace_resolved(&self, info: ResolvedInfo) {
        *self.resolved.write().unwrap_or_else(|err| err.into_inner()) = info;
    }

    pub fn title(&self) -> Option<String> {
        self.resolved.read().unwrap_or_else(|err| err.into_inner()).title.clone()
    }

    pub fn stream_url(&self) -> Option<String> {
        self.resolved
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .stream_url
            .clone()
    }

    /// Title for listings, falling back to the page URL without its scheme.
    pub fn display_title(&self) -> String {
        let resolved = self.resolved.read().unwrap_or_else(|err| err.into_inner());
        if let Some(title) = resolved.title.as_ref().filter(|t| !t.trim().is_empty()) {
            return title.clone();
        }
        let url = resolved.display_url.as_deref().unwrap_or(&self.reference_url);
        match url.split_once("://") {
            Some((_, rest)) => rest.to_string(),
            None => url.to_string(),
        }
    }

    /// True when the stream handle can be used as-is at `now`.
    ///
    /// Only kinds that are known to hand out expiring URLs are revalidated;
    /// a handle without an embedded expiry is treated as non-expiring.
    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        let resolved = self.resolved.read().unwrap_or_else(|err| err.into_inner());
        if resolved.stream_url.is_none() {
            return false;
        }
        if !self.source_kind.has_expiring_streams() {
            return true;
        }
        match resolved.stream_expiry {
            Some(expiry) => now < expiry,
            None => true,
        }
    }
}

/// Extract the `expire=<unix seconds>` query parameter from a stream URL.
pub fn parse_stream_expiry(stream_url: &str) -> Option<SystemTime> {
    let url = reqwest::Url::parse(stream_url).ok()?;
    let secs = url
        .query_pairs()
        .find(|(key, _)| key == "expire")
        .and_then(|(_, value)| value.parse::<u64>().ok())?;
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}
