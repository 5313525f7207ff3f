//! Reference resolution and stream freshness.
//!
//! Every blocking backend call goes through the single [`ResolverWorker`]
//! thread. Concurrent refreshes of the same descriptor share one spawned task
//! through the in-flight map, so the work finishes and fans out to all waiters
//! even if the caller that started it goes away.

pub(crate) mod backend;
pub(crate) mod spotify;
pub(crate) mod worker;
pub(crate) mod ytdlp;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::Result;
use audio_queue_types::{Origin, SourceKind, labels};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::descriptor::{DescriptorId, MediaDescriptor, ResolvedInfo, SharedDescriptor};
use crate::links::{self, LinkKind, LinkRules, PlaylistKind};
use backend::{ExtractBackend, ExtractError, ExtractOptions, ExtractedInfo};
use spotify::SpotifyClient;
use worker::{ResolverContext, ResolverWorker};

/// Outcome of resolving a user reference.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Single(SharedDescriptor),
    Playlist(Vec<SharedDescriptor>),
}

#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum ResolveError {
    #[error("{}: {}", labels::RESOLUTION_FAILED, .0)]
    ResolutionFailed(String),
}

impl From<ExtractError> for ResolveError {
    fn from(err: ExtractError) -> Self {
        ResolveError::ResolutionFailed(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ResolverSettings {
    pub(crate) cookie_file: Option<PathBuf>,
    pub(crate) link_rules: LinkRules,
}

type InFlight = Shared<BoxFuture<'static, bool>>;

#[derive(Clone)]
pub(crate) struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    worker: ResolverWorker,
    spotify: SpotifyClient,
    settings: ResolverSettings,
    in_flight: Mutex<HashMap<DescriptorId, InFlight>>,
}

impl Resolver {
    /// Spawn the worker thread for `backend`. Call [`Resolver::warm_up`] before serving.
    pub(crate) fn new(
        backend: Arc<dyn ExtractBackend>,
        settings: ResolverSettings,
        spotify: SpotifyClient,
    ) -> Result<Self> {
        let worker = ResolverWorker::spawn(ResolverContext::new(backend))?;
        Ok(Self {
            inner: Arc::new(ResolverInner {
                worker,
                spotify,
                settings,
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Block until the worker has started and the backend answered a probe.
    pub(crate) fn warm_up(&self) -> Result<String> {
        self.inner.worker.warm_up()
    }

    /// Resolve a user reference into one or more descriptors.
    ///
    /// `Ok(None)` means the reference is unsupported or found nothing.
    pub(crate) async fn resolve_reference(&self, reference: &str) -> Result<Option<Resolved>, ResolveError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }
        if let Some(kind) = links::playlist_kind(reference) {
            let entries = self.expand_playlist(kind, reference).await?;
            if entries.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Resolved::Playlist(entries)));
        }

        let kind = self.inner.settings.link_rules.classify(reference);
        let descriptor = match kind {
            LinkKind::Unknown => {
                if links::contains_url(reference) {
                    return Ok(None);
                }
                let Some(hit) = self.search(reference).await? else {
                    return Ok(None);
                };
                let page = hit
                    .webpage_url
                    .clone()
                    .or_else(|| hit.id.as_ref().map(|id| watch_url(id)))
                    .unwrap_or_else(|| reference.to_string());
                MediaDescriptor::with_resolved(Origin::Direct, SourceKind::WebVideo, page, resolved_from(hit))
            }
            LinkKind::SpotifyTrack => {
                let query = self
                    .inner
                    .spotify
                    .track_query(reference)
                    .await
                    .map_err(|e| ResolveError::ResolutionFailed(e.to_string()))?;
                let Some(hit) = self.search(&query).await? else {
                    return Ok(None);
                };
                MediaDescriptor::with_resolved(
                    Origin::Direct,
                    SourceKind::AudioPlatformTrack,
                    reference,
                    resolved_from(hit),
                )
            }
            LinkKind::DirectFile => MediaDescriptor::with_resolved(
                Origin::Direct,
                SourceKind::DirectFile,
                reference,
                direct_file_info(reference),
            ),
            LinkKind::Youtube
            | LinkKind::BandcampTrack
            | LinkKind::Twitter
            | LinkKind::Soundcloud
            | LinkKind::SpotifyCollection => {
                let url = if kind == LinkKind::Youtube {
                    links::strip_playlist_continuation(reference)
                } else {
                    reference
                };
                let Some(info) = self.fetch_info(url).await? else {
                    return Ok(None);
                };
                MediaDescriptor::with_resolved(Origin::Direct, kind.source_kind(), url, resolved_from(info))
            }
        };
        Ok(Some(Resolved::Single(descriptor)))
    }

    /// Make sure `descriptor` has a usable stream, refreshing it if needed.
    pub(crate) async fn ensure_fresh(&self, descriptor: &SharedDescriptor) -> bool {
        let pending = {
            let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|err| err.into_inner());
            // A finished refresh stores its result before leaving the map.
            if descriptor.is_fresh_at(SystemTime::now()) {
                return true;
            }
            if let Some(pending) = in_flight.get(&descriptor.id()) {
                pending.clone()
            } else {
                let resolver = self.clone();
                let target = descriptor.clone();
                let handle = tokio::spawn(async move {
                    let ok = resolver.refresh(&target).await;
                    resolver
                        .inner
                        .in_flight
                        .lock()
                        .unwrap_or_else(|err| err.into_inner())
                        .remove(&target.id());
                    ok
                });
                let pending = async move { handle.await.unwrap_or(false) }.boxed().shared();
                in_flight.insert(descriptor.id(), pending.clone());
                pending
            }
        };
        pending.await
    }

    async fn refresh(&self, descriptor: &SharedDescriptor) -> bool {
        let result = match descriptor.source_kind() {
            SourceKind::AudioPlatformTrack => self.refresh_by_title(descriptor).await,
            SourceKind::DirectFile => Ok(Some(direct_file_info(descriptor.reference_url()))),
            _ => self
                .fetch_info(descriptor.reference_url())
                .await
                .map(|info| info.map(resolved_from)),
        };
        match result {
            Ok(Some(info)) if info.stream_url.is_none() => {
                tracing::warn!(
                    descriptor = descriptor.id(),
                    reference = descriptor.reference_url(),
                    "resolved without a stream url"
                );
                false
            }
            Ok(Some(info)) => {
                descriptor.replace_resolved(info);
                true
            }
            Ok(None) => {
                tracing::info!(descriptor = descriptor.id(), reference = descriptor.reference_url(), "nothing playable");
                false
            }
            Err(err) => {
                tracing::warn!(
                    descriptor = descriptor.id(),
                    reference = descriptor.reference_url(),
                    error = %err,
                    "refresh failed"
                );
                false
            }
        }
    }

    async fn refresh_by_title(&self, descriptor: &SharedDescriptor) -> Result<Option<ResolvedInfo>, ResolveError> {
        let query = self
            .inner
            .spotify
            .track_query(descriptor.reference_url())
            .await
            .map_err(|e| ResolveError::ResolutionFailed(e.to_string()))?;
        Ok(self.search(&query).await?.map(resolved_from))
    }

    /// Extract one item, retrying without a format constraint on unexpected errors.
    async fn fetch_info(&self, url: &str) -> Result<Option<ExtractedInfo>, ResolveError> {
        let url = url.to_string();
        let cookie_file = self.inner.settings.cookie_file.clone();
        let outcome = self
            .inner
            .worker
            .run(move |ctx| match ctx.extract(&url, &ExtractOptions::best_audio(cookie_file.clone())) {
                Err(ExtractError::Unexpected(reason)) => {
                    tracing::debug!(reference = %url, error = %reason, "retrying without format");
                    ctx.extract(&url, &ExtractOptions::any_format(cookie_file))
                }
                other => other,
            })
            .await?;
        expected_as_none(outcome)
    }

    async fn search(&self, query: &str) -> Result<Option<ExtractedInfo>, ResolveError> {
        let target = format!("ytsearch:{query}");
        let options = ExtractOptions::search(self.inner.settings.cookie_file.clone());
        let outcome = self.inner.worker.run(move |ctx| ctx.extract(&target, &options)).await?;
        Ok(expected_as_none(outcome)?.and_then(ExtractedInfo::first_entry))
    }

    async fn expand_playlist(&self, kind: PlaylistKind, url: &str) -> Result<Vec<SharedDescriptor>, ResolveError> {
        let entries = match kind {
            PlaylistKind::Spotify => {
                let links = self
                    .inner
                    .spotify
                    .collection_links(url)
                    .await
                    .map_err(|e| ResolveError::ResolutionFailed(e.to_string()))?;
                links
                    .into_iter()
                    .map(|link| MediaDescriptor::new(Origin::FromPlaylist, SourceKind::AudioPlatformTrack, link))
                    .collect()
            }
            PlaylistKind::Youtube | PlaylistKind::Bandcamp => {
                let cookie_file = match kind {
                    PlaylistKind::Youtube => self.inner.settings.cookie_file.clone(),
                    _ => None,
                };
                let options = ExtractOptions::flat_playlist(cookie_file);
                let target = url.to_string();
                let outcome = self.inner.worker.run(move |ctx| ctx.extract(&target, &options)).await?;
                let Some(listing) = expected_as_none(outcome)? else {
                    return Ok(Vec::new());
                };
                listing
                    .entries
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|entry| playlist_entry(kind, entry))
                    .collect()
            }
        };
        Ok(entries)
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.inner.in_flight.lock().unwrap_or_else(|err| err.into_inner()).len()
    }
}

fn expected_as_none(outcome: Result<ExtractedInfo, ExtractError>) -> Result<Option<ExtractedInfo>, ResolveError> {
    match outcome {
        Ok(info) => Ok(Some(info)),
        Err(ExtractError::Expected(reason)) => {
            tracing::debug!(reason = %reason, "backend reported no result");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn playlist_entry(kind: PlaylistKind, entry: ExtractedInfo) -> Option<SharedDescriptor> {
    let (source_kind, url) = match kind {
        PlaylistKind::Youtube => (SourceKind::WebVideo, watch_url(entry.id.as_deref()?)),
        _ => (SourceKind::OtherPlatform, entry.url.clone().or(entry.webpage_url.clone())?),
    };
    let resolved = ResolvedInfo {
        title: entry.title,
        uploader: entry.uploader,
        duration_secs: entry.duration.map(secs_from_f64),
        ..ResolvedInfo::default()
    };
    Some(MediaDescriptor::with_resolved(Origin::FromPlaylist, source_kind, url, resolved))
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

fn direct_file_info(url: &str) -> ResolvedInfo {
    ResolvedInfo {
        title: Some(links::file_title(url).to_string()),
        uploader: Some(labels::UNKNOWN_TITLE.to_string()),
        display_url: Some(url.to_string()),
        ..ResolvedInfo::with_stream(Some(url.to_string()))
    }
}

fn resolved_from(info: ExtractedInfo) -> ResolvedInfo {
    ResolvedInfo {
        title: info.title,
        uploader: info.uploader,
        display_url: info.webpage_url,
        duration_secs: info.duration.map(secs_from_f64),
        thumbnail: info.thumbnail,
        ..ResolvedInfo::with_stream(info.url)
    }
}

fn secs_from_f64(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 { value.round() as u64 } else { 0 }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedBackend, resolver_for};
    use super::*;
    use std::time::Duration;

    const VIDEO: &str = "https://www.youtube.com/watch?v=abc";

    #[tokio::test]
    async fn concurrent_refreshes_share_one_backend_call() {
        let backend = Arc::new(ScriptedBackend::with_delay(Duration::from_millis(100)));
        backend.stream(VIDEO, "https://cdn.example/a?expire=99999999999");
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, VIDEO);

        let waits = (0..8).map(|_| resolver.ensure_fresh(&descriptor));
        let results = futures_util::future::join_all(waits).await;

        assert!(results.into_iter().all(|ok| ok));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(descriptor.title().as_deref(), Some("title of https://www.youtube.com/watch?v=abc"));
        assert_eq!(resolver.in_flight_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_callers_see_finished_refresh() {
        let backend = Arc::new(ScriptedBackend::with_delay(Duration::from_millis(20)));
        backend.stream(VIDEO, "https://cdn.example/a?expire=99999999999");
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, VIDEO);

        let callers: Vec<_> = (0..40u64)
            .map(|i| {
                let resolver = resolver.clone();
                let descriptor = descriptor.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(i)).await;
                    resolver.ensure_fresh(&descriptor).await
                })
            })
            .collect();
        for caller in callers {
            assert!(caller.await.unwrap());
        }
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn result_without_stream_url_is_not_fresh() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.answer(
            VIDEO,
            Ok(ExtractedInfo {
                title: Some("merged formats only".to_string()),
                ..ExtractedInfo::default()
            }),
        );
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, VIDEO);
        assert!(!resolver.ensure_fresh(&descriptor).await);
        assert!(descriptor.stream_url().is_none());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn refresh_completes_when_initiator_is_dropped() {
        let backend = Arc::new(ScriptedBackend::with_delay(Duration::from_millis(100)));
        backend.stream(VIDEO, "https://cdn.example/a");
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, VIDEO);

        let initiator = {
            let resolver = resolver.clone();
            let descriptor = descriptor.clone();
            tokio::spawn(async move { resolver.ensure_fresh(&descriptor).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        initiator.abort();

        assert!(resolver.ensure_fresh(&descriptor).await);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(descriptor.stream_url().as_deref(), Some("https://cdn.example/a"));
    }

    #[tokio::test]
    async fn fresh_descriptor_skips_backend() {
        let backend = Arc::new(ScriptedBackend::default());
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::with_resolved(
            Origin::Direct,
            SourceKind::WebVideo,
            VIDEO,
            ResolvedInfo::with_stream(Some("https://cdn.example/a?expire=99999999999".to_string())),
        );
        assert!(resolver.ensure_fresh(&descriptor).await);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn expired_stream_is_re_resolved() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.stream(VIDEO, "https://cdn.example/new");
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::with_resolved(
            Origin::Direct,
            SourceKind::WebVideo,
            VIDEO,
            ResolvedInfo::with_stream(Some("https://cdn.example/old?expire=1".to_string())),
        );
        assert!(resolver.ensure_fresh(&descriptor).await);
        assert_eq!(descriptor.stream_url().as_deref(), Some("https://cdn.example/new"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn unexpected_failure_retries_once_without_format() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.answer(VIDEO, Err(ExtractError::Unexpected("boom".to_string())));
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, VIDEO);
        assert!(!resolver.ensure_fresh(&descriptor).await);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn expected_failure_does_not_retry() {
        let backend = Arc::new(ScriptedBackend::default());
        let resolver = resolver_for(&backend);
        let descriptor = MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, VIDEO);
        assert!(!resolver.ensure_fresh(&descriptor).await);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn text_with_unknown_url_is_unsupported() {
        let backend = Arc::new(ScriptedBackend::default());
        let resolver = resolver_for(&backend);
        let result = resolver
            .resolve_reference("listen to https://example.com/page")
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn free_text_searches_and_uses_first_hit() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.answer(
            "ytsearch:daft punk",
            Ok(ExtractedInfo {
                entries: Some(vec![
                    ExtractedInfo {
                        id: Some("one".to_string()),
                        title: Some("First".to_string()),
                        url: Some("https://cdn.example/1".to_string()),
                        ..ExtractedInfo::default()
                    },
                    ExtractedInfo {
                        id: Some("two".to_string()),
                        ..ExtractedInfo::default()
                    },
                ]),
                ..ExtractedInfo::default()
            }),
        );
        let resolver = resolver_for(&backend);
        let Some(Resolved::Single(descriptor)) = resolver.resolve_reference("daft punk").await.unwrap() else {
            panic!("expected a single descriptor");
        };
        assert_eq!(descriptor.reference_url(), "https://www.youtube.com/watch?v=one");
        assert_eq!(descriptor.source_kind(), SourceKind::WebVideo);
        assert_eq!(descriptor.title().as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn search_without_results_is_unsupported() {
        let backend = Arc::new(ScriptedBackend::default());
        let resolver = resolver_for(&backend);
        assert!(resolver.resolve_reference("nothing matches").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unexpected_search_failure_surfaces() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.answer("ytsearch:broken", Err(ExtractError::Unexpected("network".to_string())));
        let resolver = resolver_for(&backend);
        let err = resolver.resolve_reference("broken").await.unwrap_err();
        assert!(matches!(err, ResolveError::ResolutionFailed(_)));
        assert!(err.to_string().starts_with(labels::RESOLUTION_FAILED));
    }

    #[tokio::test]
    async fn video_link_drops_list_continuation() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.stream(VIDEO, "https://cdn.example/a");
        let resolver = resolver_for(&backend);
        let resolved = resolver
            .resolve_reference("https://www.youtube.com/watch?v=abc&list=PL9")
            .await
            .unwrap();
        let Some(Resolved::Single(descriptor)) = resolved else {
            panic!("expected a single descriptor");
        };
        assert_eq!(descriptor.reference_url(), VIDEO);
        assert!(descriptor.is_fresh_at(SystemTime::now()));
    }

    #[tokio::test]
    async fn direct_file_needs_no_backend() {
        let backend = Arc::new(ScriptedBackend::default());
        let resolver = resolver_for(&backend);
        let Some(Resolved::Single(descriptor)) = resolver
            .resolve_reference("https://files.example/music/song.mp3")
            .await
            .unwrap()
        else {
            panic!("expected a single descriptor");
        };
        assert_eq!(descriptor.source_kind(), SourceKind::DirectFile);
        assert_eq!(descriptor.title().as_deref(), Some("song.mp3"));
        assert!(resolver.ensure_fresh(&descriptor).await);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn video_playlist_expands_without_resolving_members() {
        let backend = Arc::new(ScriptedBackend::default());
        let playlist = "https://www.youtube.com/playlist?list=PL1";
        backend.answer(
            playlist,
            Ok(ExtractedInfo {
                entries: Some(vec![
                    ExtractedInfo {
                        id: Some("a".to_string()),
                        title: Some("A".to_string()),
                        ..ExtractedInfo::default()
                    },
                    ExtractedInfo {
                        id: Some("b".to_string()),
                        ..ExtractedInfo::default()
                    },
                ]),
                ..ExtractedInfo::default()
            }),
        );
        let resolver = resolver_for(&backend);
        let Some(Resolved::Playlist(entries)) = resolver.resolve_reference(playlist).await.unwrap() else {
            panic!("expected a playlist");
        };
        let urls: Vec<_> = entries.iter().map(|d| d.reference_url().to_string()).collect();
        assert_eq!(
            urls,
            vec!["https://www.youtube.com/watch?v=a", "https://www.youtube.com/watch?v=b"]
        );
        assert!(entries.iter().all(|d| d.origin() == Origin::FromPlaylist));
        assert!(entries.iter().all(|d| d.stream_url().is_none()));
        assert_eq!(backend.call_count(), 1);
    }
}
