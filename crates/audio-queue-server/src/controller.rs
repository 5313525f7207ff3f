//! Per-session playback controller.
//!
//! Owns one [`Queue`] and sequences transitions between `Idle`, `Playing`
//! and `Paused`. Queue state sits behind a plain mutex that is never held
//! across an await; transitions (play head, finished, skip, back, stop) are
//! serialized by an async lock so only one of them touches the sink at a time.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use actix_web::HttpResponse;
use audio_queue_types::{LoopMode, LoopState, PauseState, PlayerState, labels};
use futures_util::future::join_all;

use crate::descriptor::SharedDescriptor;
use crate::events::{EventBus, SessionEvent};
use crate::idle_timer::IdleTimer;
use crate::models::{EntryView, ErrorResponse, QueueResponse};
use crate::playback_sink::{FinishedCallback, PlayRequest, PlaybackSink, SinkError, gain_from_percent};
use crate::queue::{Queue, QueueError, QueueLimits};
use crate::resolver::{ResolveError, Resolved, Resolver};

pub(crate) const DEFAULT_PRELOAD_LOOKAHEAD: usize = 5;
pub(crate) const MAX_PRELOAD_LOOKAHEAD: usize = 25;
pub(crate) const DEFAULT_VOLUME: u8 = 100;
pub(crate) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const VOLUME_STEP: u8 = 10;
const MIN_STEPPED_VOLUME: u8 = 10;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("{}", labels::VOLUME_OUT_OF_RANGE)]
    VolumeOutOfRange(i64),
    #[error("{}: {}", labels::SESSION_NOT_FOUND, .0)]
    SessionNotFound(String),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl CommandError {
    /// Convert a command error into an HTTP response.
    pub(crate) fn into_response(self) -> HttpResponse {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        match self {
            CommandError::Resolution(_) => HttpResponse::BadGateway().json(body),
            CommandError::Queue(_) | CommandError::VolumeOutOfRange(_) => HttpResponse::BadRequest().json(body),
            CommandError::SessionNotFound(_) => HttpResponse::NotFound().json(body),
            CommandError::Sink(_) => HttpResponse::ServiceUnavailable().json(body),
        }
    }
}

/// What a successful submit added to the queue.
#[derive(Debug, Clone)]
pub(crate) enum Submitted {
    Track(SharedDescriptor),
    Playlist { count: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct ControllerSettings {
    pub(crate) limits: QueueLimits,
    /// Entries kept resolved ahead, current one included.
    pub(crate) preload_lookahead: usize,
    pub(crate) default_volume: u8,
    pub(crate) idle_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            limits: QueueLimits::default(),
            preload_lookahead: DEFAULT_PRELOAD_LOOKAHEAD,
            default_volume: DEFAULT_VOLUME,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Transition prepared by a command before it stopped the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTransition {
    /// The queue already holds the entry to play next at its head.
    PlayHead,
    Stop,
}

struct SessionState {
    queue: Queue,
    player: PlayerState,
    current: Option<SharedDescriptor>,
    pending: Option<PendingTransition>,
    volume: u8,
    /// Bumped on every `play`; finished callbacks from older streams are ignored.
    generation: u64,
}

#[derive(Clone)]
pub(crate) struct PlaybackController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    session_id: String,
    resolver: Resolver,
    sink: Arc<dyn PlaybackSink>,
    events: EventBus,
    preload_lookahead: usize,
    state: Mutex<SessionState>,
    transition: tokio::sync::Mutex<()>,
    idle: IdleTimer,
}

impl PlaybackController {
    pub(crate) fn new(
        session_id: impl Into<String>,
        resolver: Resolver,
        sink: Arc<dyn PlaybackSink>,
        events: EventBus,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                session_id: session_id.into(),
                resolver,
                sink,
                events,
                preload_lookahead: settings.preload_lookahead.clamp(1, MAX_PRELOAD_LOOKAHEAD),
                state: Mutex::new(SessionState {
                    queue: Queue::new(settings.limits),
                    player: PlayerState::Idle,
                    current: None,
                    pending: None,
                    volume: settings.default_volume.min(100),
                    generation: 0,
                }),
                transition: tokio::sync::Mutex::new(()),
                idle: IdleTimer::new(settings.idle_timeout),
            }),
        }
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub(crate) fn player_state(&self) -> PlayerState {
        self.state().player
    }

    pub(crate) fn queued(&self) -> usize {
        self.state().queue.len()
    }

    pub(crate) fn volume(&self) -> u8 {
        self.state().volume
    }

    /// Resolve `reference`, queue the result and start playback when idle.
    ///
    /// `Ok(None)` means the reference is unsupported or found nothing.
    pub(crate) async fn submit(&self, reference: &str) -> Result<Option<Submitted>, CommandError> {
        tracing::info!(session = %self.inner.session_id, reference, "submit");
        let Some(resolved) = self.inner.resolver.resolve_reference(reference).await? else {
            tracing::info!(session = %self.inner.session_id, reference, "{}", labels::UNSUPPORTED_REFERENCE);
            return Ok(None);
        };
        let submitted = match resolved {
            Resolved::Single(descriptor) => {
                self.enqueue(vec![descriptor.clone()]).await;
                Submitted::Track(descriptor)
            }
            Resolved::Playlist(entries) => {
                let count = entries.len();
                self.enqueue(entries).await;
                Submitted::Playlist { count }
            }
        };
        Ok(Some(submitted))
    }

    /// Append descriptors and start playback if the session is idle.
    pub(crate) async fn enqueue(&self, descriptors: Vec<SharedDescriptor>) {
        {
            let mut state = self.state();
            for descriptor in descriptors {
                state.queue.add(descriptor);
            }
        }
        self.inner.events.queue_changed(&self.inner.session_id);

        let transition = self.inner.transition.lock().await;
        if self.state().player != PlayerState::Idle {
            drop(transition);
            self.spawn_prefetch();
            return;
        }
        if let Err(err) = self.play_head_locked().await {
            tracing::warn!(session = %self.inner.session_id, error = %err, "playback did not start");
        }
    }

    /// Skip the current entry, ignoring single-entry loop.
    ///
    /// Returns `false` when there was nothing to skip to.
    pub(crate) async fn skip_forced(&self) -> Result<bool, CommandError> {
        let _transition = self.inner.transition.lock().await;
        self.inner.idle.cancel();
        let skipped = {
            let mut state = self.state();
            if state.player == PlayerState::Idle {
                None
            } else {
                let next = state.queue.advance(true);
                state.pending = Some(PendingTransition::PlayHead);
                Some(next.is_some())
            }
        };
        if let Some(has_next) = skipped {
            self.inner.sink.stop().await?;
            return Ok(has_next);
        }
        let next = {
            let mut state = self.state();
            record_current_title(&mut state);
            state.queue.advance(true)
        };
        if next.is_none() {
            self.go_idle();
            return Ok(false);
        }
        self.play_head_locked().await?;
        Ok(true)
    }

    /// Step back to the previous entry. Returns `false` when there is none.
    pub(crate) async fn back(&self) -> Result<bool, CommandError> {
        let _transition = self.inner.transition.lock().await;
        let active = {
            let mut state = self.state();
            if state.queue.rewind().is_none() {
                return Ok(false);
            }
            let active = state.player != PlayerState::Idle;
            if active {
                state.pending = Some(PendingTransition::PlayHead);
            }
            active
        };
        self.inner.events.queue_changed(&self.inner.session_id);
        if active {
            self.inner.sink.stop().await?;
        } else {
            self.play_head_locked().await?;
        }
        Ok(true)
    }

    /// Toggle pause. Pausing starts the idle countdown; resuming cancels it.
    pub(crate) async fn pause(&self) -> Result<PauseState, CommandError> {
        let _transition = self.inner.transition.lock().await;
        let player = self.state().player;
        match player {
            PlayerState::Playing => {
                self.inner.sink.pause().await?;
                self.state().player = PlayerState::Paused;
                self.start_idle_timer();
                Ok(PauseState::Paused)
            }
            PlayerState::Paused => {
                self.inner.sink.resume().await?;
                self.state().player = PlayerState::Playing;
                self.inner.idle.cancel();
                Ok(PauseState::Resumed)
            }
            PlayerState::Idle => Ok(PauseState::NothingToPause),
        }
    }

    /// Set the loop mode; `None` toggles between `Off` and `All`.
    pub(crate) fn set_loop_mode(&self, mode: Option<LoopMode>) -> (LoopState, LoopMode) {
        let mut state = self.state();
        let mode = mode.unwrap_or(match state.queue.loop_mode() {
            LoopMode::Off => LoopMode::All,
            _ => LoopMode::Off,
        });
        state.queue.set_loop_mode(mode);
        let result = if mode == LoopMode::Off {
            LoopState::Disabled
        } else {
            LoopState::Enabled
        };
        (result, mode)
    }

    pub(crate) fn remove(&self, index: i64) -> Result<SharedDescriptor, CommandError> {
        let removed = self.state().queue.remove(index)?;
        self.inner.events.queue_changed(&self.inner.session_id);
        Ok(removed)
    }

    pub(crate) fn move_entry(&self, from: i64, to: i64) -> Result<SharedDescriptor, CommandError> {
        let moved = self.state().queue.move_item(from, to)?;
        self.inner.events.queue_changed(&self.inner.session_id);
        self.spawn_prefetch();
        Ok(moved)
    }

    pub(crate) fn shuffle(&self) {
        self.state().queue.shuffle();
        self.inner.events.queue_changed(&self.inner.session_id);
        self.spawn_prefetch();
    }

    /// Drop everything queued after the current entry.
    pub(crate) fn clear(&self) {
        self.state().queue.clear();
        self.inner.events.queue_changed(&self.inner.session_id);
    }

    /// Turn loop off, drop the queue and stop the sink.
    pub(crate) async fn stop(&self) -> Result<(), CommandError> {
        let _transition = self.inner.transition.lock().await;
        let active = {
            let mut state = self.state();
            state.queue.set_loop_mode(LoopMode::Off);
            state.queue.clear();
            state.queue.advance(false);
            let active = state.player != PlayerState::Idle;
            if active {
                state.pending = Some(PendingTransition::Stop);
            }
            active
        };
        self.inner.events.queue_changed(&self.inner.session_id);
        if active {
            self.inner.sink.stop().await?;
        }
        Ok(())
    }

    /// Set the volume in percent. Values outside `0..=100` are rejected.
    pub(crate) async fn set_volume(&self, value: i64) -> Result<u8, CommandError> {
        let percent = u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or(CommandError::VolumeOutOfRange(value))?;
        let active = {
            let mut state = self.state();
            state.volume = percent;
            state.player != PlayerState::Idle
        };
        if active {
            self.inner.sink.set_volume(gain_from_percent(percent)).await?;
        }
        Ok(percent)
    }

    pub(crate) async fn volume_up(&self) -> Result<u8, CommandError> {
        let next = self.volume().saturating_add(VOLUME_STEP).min(100);
        self.set_volume(i64::from(next)).await
    }

    pub(crate) async fn volume_down(&self) -> Result<u8, CommandError> {
        let next = self.volume().saturating_sub(VOLUME_STEP).max(MIN_STEPPED_VOLUME);
        self.set_volume(i64::from(next)).await
    }

    /// Titles of finished entries, oldest first.
    pub(crate) fn track_history(&self) -> Vec<String> {
        self.state().queue.title_history().map(str::to_string).collect()
    }

    pub(crate) fn queue_view(&self) -> QueueResponse {
        let state = self.state();
        let snapshot = state
            .queue
            .snapshot(self.inner.preload_lookahead.saturating_sub(1).max(1));
        let now_playing = state.current.as_ref().or(snapshot.current.as_ref());
        QueueResponse {
            session: self.inner.session_id.clone(),
            state: state.player,
            now_playing: now_playing.map(|d| EntryView::from_descriptor(d)),
            upcoming: snapshot.upcoming.iter().map(|d| EntryView::from_descriptor(d)).collect(),
            total: snapshot.total,
            loop_mode: snapshot.loop_mode,
            has_next: snapshot.has_next,
            has_prev: snapshot.has_prev,
            volume: state.volume,
        }
    }

    /// Handle the end of the stream started with `generation`.
    pub(crate) async fn on_playback_finished(&self, generation: u64) {
        let _transition = self.inner.transition.lock().await;
        let pending = {
            let mut state = self.state();
            if state.generation != generation || state.player == PlayerState::Idle {
                tracing::debug!(session = %self.inner.session_id, generation, "stale finish ignored");
                return;
            }
            record_current_title(&mut state);
            state.player = PlayerState::Idle;
            let pending = state.pending.take();
            if pending.is_none() {
                state.queue.advance(false);
            }
            pending
        };
        if pending == Some(PendingTransition::Stop) {
            self.go_idle();
            self.inner.events.publish(SessionEvent::Stopped {
                session: self.inner.session_id.clone(),
            });
            return;
        }
        self.inner.events.queue_changed(&self.inner.session_id);
        if let Err(err) = self.play_head_locked().await {
            tracing::warn!(session = %self.inner.session_id, error = %err, "next entry did not start");
        }
    }

    /// Play the queue head, dropping entries that cannot be made playable.
    ///
    /// Caller holds the transition lock. Gives up after as many failures as
    /// the queue had entries so a looping queue of broken entries terminates.
    async fn play_head_locked(&self) -> Result<(), CommandError> {
        let mut attempts_left = self.state().queue.len();
        loop {
            let head = self.state().queue.head();
            let Some(head) = head else {
                self.go_idle();
                return Ok(());
            };
            if attempts_left == 0 {
                tracing::warn!(session = %self.inner.session_id, "no playable entry in queue");
                self.go_idle();
                return Ok(());
            }
            attempts_left -= 1;

            let stream_url = if self.inner.resolver.ensure_fresh(&head).await {
                head.stream_url()
            } else {
                None
            };
            let Some(stream_url) = stream_url else {
                tracing::warn!(
                    session = %self.inner.session_id,
                    descriptor = head.id(),
                    reference = head.reference_url(),
                    "unplayable entry, skipping"
                );
                self.inner.events.publish(SessionEvent::EntryDropped {
                    session: self.inner.session_id.clone(),
                    title: head.display_title(),
                    url: head.reference_url().to_string(),
                });
                let mut state = self.state();
                if state.queue.head().is_some_and(|h| h.id() == head.id()) {
                    state.queue.advance(true);
                }
                continue;
            };

            let (request, generation) = {
                let mut state = self.state();
                if !state.queue.head().is_some_and(|h| h.id() == head.id()) {
                    // Head changed while resolving; re-evaluate.
                    continue;
                }
                state.generation += 1;
                let request = PlayRequest {
                    stream_url,
                    title: head.display_title(),
                    reference_url: head.reference_url().to_string(),
                    volume: gain_from_percent(state.volume),
                };
                (request, state.generation)
            };

            if let Err(err) = self.inner.sink.play(request, self.finished_callback(generation)).await {
                tracing::error!(session = %self.inner.session_id, error = %err, "sink rejected playback");
                self.go_idle();
                return Err(err.into());
            }
            {
                let mut state = self.state();
                state.player = PlayerState::Playing;
                state.current = Some(head.clone());
            }
            self.inner.idle.cancel();
            tracing::info!(session = %self.inner.session_id, title = %head.display_title(), "now playing");
            self.inner.events.publish(SessionEvent::NowPlaying {
                session: self.inner.session_id.clone(),
                title: head.display_title(),
                url: head.reference_url().to_string(),
            });
            self.spawn_prefetch();
            return Ok(());
        }
    }

    /// Keep the entries after the head resolved, dropping ones that fail.
    pub(crate) async fn prefetch_ahead(&self) {
        let window = self.inner.preload_lookahead.saturating_sub(1);
        loop {
            let upcoming = self.state().queue.upcoming(window);
            if upcoming.is_empty() {
                return;
            }
            let results = join_all(upcoming.iter().map(|d| self.inner.resolver.ensure_fresh(d))).await;
            let mut removed = Vec::new();
            {
                let mut state = self.state();
                for (descriptor, ok) in upcoming.iter().zip(results) {
                    if !ok && state.queue.remove_descriptor(descriptor.id()) {
                        removed.push(descriptor.clone());
                    }
                }
            }
            if removed.is_empty() {
                return;
            }
            for descriptor in &removed {
                tracing::info!(
                    session = %self.inner.session_id,
                    reference = descriptor.reference_url(),
                    "dropping entry that failed to preload"
                );
                self.inner.events.publish(SessionEvent::EntryDropped {
                    session: self.inner.session_id.clone(),
                    title: descriptor.display_title(),
                    url: descriptor.reference_url().to_string(),
                });
            }
            self.inner.events.queue_changed(&self.inner.session_id);
        }
    }

    fn spawn_prefetch(&self) {
        let controller = self.clone();
        tokio::spawn(async move { controller.prefetch_ahead().await });
    }

    fn finished_callback(&self, generation: u64) -> FinishedCallback {
        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        let runtime = tokio::runtime::Handle::current();
        Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            runtime.spawn(async move {
                PlaybackController { inner }.on_playback_finished(generation).await;
            });
        })
    }

    fn go_idle(&self) {
        {
            let mut state = self.state();
            state.player = PlayerState::Idle;
            state.current = None;
            state.pending = None;
        }
        // An expired countdown stays expired until playback resumes.
        if !self.inner.idle.triggered() && !self.inner.idle.is_running() {
            self.start_idle_timer();
        }
    }

    fn start_idle_timer(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.idle.start(async move {
            if let Some(inner) = weak.upgrade() {
                PlaybackController { inner }.on_idle_timeout().await;
            }
        });
    }

    async fn on_idle_timeout(&self) {
        if self.player_state() == PlayerState::Playing {
            return;
        }
        tracing::info!(session = %self.inner.session_id, "idle timeout");
        if let Err(err) = self.stop().await {
            tracing::warn!(session = %self.inner.session_id, error = %err, "stop on idle timeout failed");
        }
        self.state().queue.empty();
        self.inner.events.publish(SessionEvent::IdleTimeout {
            session: self.inner.session_id.clone(),
        });
    }
}

fn record_current_title(state: &mut SessionState) {
    if let Some(current) = state.current.take() {
        let title = current.title().unwrap_or_else(|| labels::UNKNOWN_TITLE.to_string());
        state.queue.record_title(title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MediaDescriptor, ResolvedInfo};
    use crate::playback_sink::testing::RecordingSink;
    use crate::resolver::backend::ExtractedInfo;
    use crate::resolver::testing::{ScriptedBackend, resolver_for};
    use audio_queue_types::{Origin, SourceKind};

    struct Harness {
        controller: PlaybackController,
        backend: Arc<ScriptedBackend>,
        sink: Arc<RecordingSink>,
        events: EventBus,
    }

    fn harness_with(settings: ControllerSettings) -> Harness {
        harness_with_backend(settings, Arc::new(ScriptedBackend::default()))
    }

    fn harness_with_backend(settings: ControllerSettings, backend: Arc<ScriptedBackend>) -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let events = EventBus::new();
        let controller =
            PlaybackController::new("test", resolver_for(&backend), sink.clone(), events.clone(), settings);
        Harness {
            controller,
            backend,
            sink,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(ControllerSettings::default())
    }

    fn ready(name: &str) -> SharedDescriptor {
        MediaDescriptor::with_resolved(
            Origin::Direct,
            SourceKind::DirectFile,
            format!("https://files/{name}.mp3"),
            ResolvedInfo {
                title: Some(name.to_string()),
                ..ResolvedInfo::with_stream(Some(format!("https://files/{name}.mp3")))
            },
        )
    }

    fn broken(name: &str) -> SharedDescriptor {
        MediaDescriptor::new(Origin::Direct, SourceKind::WebVideo, format!("https://www.youtube.com/watch?v={name}"))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn stream_of(name: &str) -> String {
        format!("https://files/{name}.mp3")
    }

    #[tokio::test]
    async fn unsupported_submit_returns_none() {
        let h = harness();
        let result = h.controller.submit("see https://example.com/page").await.unwrap();
        assert!(result.is_none());
        assert_eq!(h.controller.queued(), 0);
        assert_eq!(h.controller.player_state(), PlayerState::Idle);
        assert!(h.sink.played_urls().is_empty());
    }

    #[tokio::test]
    async fn submit_starts_playback_when_idle() {
        let h = harness();
        let submitted = h.controller.submit("https://files/a.mp3").await.unwrap();
        assert!(matches!(submitted, Some(Submitted::Track(_))));
        assert_eq!(h.controller.player_state(), PlayerState::Playing);
        assert_eq!(h.sink.played_urls(), vec![stream_of("a")]);

        h.controller.submit("https://files/b.mp3").await.unwrap();
        assert_eq!(h.sink.played_urls().len(), 1);
        assert_eq!(h.controller.queued(), 2);
    }

    #[tokio::test]
    async fn resolution_failure_is_surfaced() {
        let h = harness();
        h.backend.answer(
            "ytsearch:bad",
            Err(crate::resolver::backend::ExtractError::Unexpected("down".to_string())),
        );
        let err = h.controller.submit("bad").await.unwrap_err();
        assert!(matches!(err, CommandError::Resolution(_)));
    }

    #[tokio::test]
    async fn natural_end_advances_and_records_title() {
        let h = harness();
        h.controller.enqueue(vec![ready("a"), ready("b")]).await;
        assert!(h.sink.finish_current());
        wait_until(|| h.sink.played_urls().len() == 2).await;
        assert_eq!(h.sink.played_urls(), vec![stream_of("a"), stream_of("b")]);
        assert_eq!(h.controller.track_history(), vec!["a"]);
        let view = h.controller.queue_view();
        assert_eq!(view.now_playing.unwrap().title, "b");
        assert!(view.has_prev);
    }

    #[tokio::test]
    async fn queue_runs_dry_and_goes_idle() {
        let h = harness();
        h.controller.enqueue(vec![ready("a")]).await;
        h.sink.finish_current();
        wait_until(|| h.controller.player_state() == PlayerState::Idle).await;
        assert_eq!(h.controller.queued(), 0);
        assert_eq!(h.controller.track_history(), vec!["a"]);
    }

    #[tokio::test]
    async fn single_loop_replays_on_natural_end() {
        let h = harness();
        h.controller.enqueue(vec![ready("a"), ready("b")]).await;
        h.controller.set_loop_mode(Some(LoopMode::Single));
        h.sink.finish_current();
        wait_until(|| h.sink.played_urls().len() == 2).await;
        assert_eq!(h.sink.played_urls(), vec![stream_of("a"), stream_of("a")]);
    }

    #[tokio::test]
    async fn forced_skip_moves_on_even_in_single_loop() {
        let h = harness();
        h.controller.enqueue(vec![ready("a"), ready("b"), ready("c")]).await;
        h.controller.set_loop_mode(Some(LoopMode::Single));
        assert!(h.controller.skip_forced().await.unwrap());
        wait_until(|| h.sink.played_urls().len() == 2).await;
        assert_eq!(h.sink.played_urls()[1], stream_of("b"));
        assert_eq!(h.controller.queued(), 2);
    }

    #[tokio::test]
    async fn back_replays_previous_entry() {
        let h = harness();
        h.controller.enqueue(vec![ready("a"), ready("b")]).await;
        h.sink.finish_current();
        wait_until(|| h.sink.played_urls().len() == 2).await;
        assert!(h.controller.back().await.unwrap());
        wait_until(|| h.sink.played_urls().len() == 3).await;
        assert_eq!(h.sink.played_urls()[2], stream_of("a"));
        assert_eq!(h.controller.queued(), 2);
    }

    #[tokio::test]
    async fn back_without_history_reports_false() {
        let h = harness();
        h.controller.enqueue(vec![ready("a")]).await;
        assert!(!h.controller.back().await.unwrap());
    }

    #[tokio::test]
    async fn all_broken_queue_terminates_in_off_mode() {
        let h = harness();
        h.controller.enqueue(vec![broken("x"), broken("y"), broken("z")]).await;
        assert_eq!(h.controller.player_state(), PlayerState::Idle);
        assert_eq!(h.controller.queued(), 0);
        assert!(h.sink.played_urls().is_empty());
    }

    #[tokio::test]
    async fn all_broken_queue_terminates_in_all_mode() {
        let h = harness();
        h.controller.set_loop_mode(Some(LoopMode::All));
        h.controller.enqueue(vec![broken("x"), broken("y")]).await;
        assert_eq!(h.controller.player_state(), PlayerState::Idle);
        assert_eq!(h.controller.queued(), 2);
        assert!(h.sink.played_urls().is_empty());
    }

    #[tokio::test]
    async fn broken_head_is_skipped() {
        let h = harness();
        let mut rx = h.events.subscribe();
        h.controller.enqueue(vec![broken("x"), ready("a")]).await;
        assert_eq!(h.sink.played_urls(), vec![stream_of("a")]);
        let mut dropped = false;
        while let Ok(event) = rx.try_recv() {
            dropped |= matches!(event, SessionEvent::EntryDropped { .. });
        }
        assert!(dropped);
    }

    #[tokio::test]
    async fn entry_resolving_without_stream_is_skipped() {
        let h = harness();
        let silent = broken("silent");
        h.backend.answer(
            silent.reference_url(),
            Ok(ExtractedInfo {
                title: Some("merged formats only".to_string()),
                ..ExtractedInfo::default()
            }),
        );
        h.controller.enqueue(vec![silent, ready("a")]).await;
        assert_eq!(h.sink.played_urls(), vec![stream_of("a")]);
        assert_eq!(h.controller.player_state(), PlayerState::Playing);
        assert_eq!(h.controller.queued(), 1);
        assert_eq!(h.backend.call_count(), 1);
    }

    #[tokio::test]
    async fn skip_past_last_entry_reports_false() {
        let h = harness();
        h.controller.enqueue(vec![ready("a")]).await;
        assert!(!h.controller.skip_forced().await.unwrap());
        wait_until(|| h.controller.player_state() == PlayerState::Idle).await;
        assert_eq!(h.controller.queued(), 0);
    }

    #[tokio::test]
    async fn prefetch_reruns_when_removal_shifts_window() {
        let h = harness_with(ControllerSettings {
            preload_lookahead: 2,
            ..ControllerSettings::default()
        });
        let good = broken("good");
        h.backend.stream(good.reference_url(), "https://cdn/good");
        h.controller.enqueue(vec![ready("a"), broken("bad"), good.clone()]).await;
        wait_until(|| good.stream_url().is_some()).await;
        assert_eq!(h.controller.queued(), 2);
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn mutations_during_prefetch_keep_their_order() {
        let backend = Arc::new(ScriptedBackend::with_delay(Duration::from_millis(100)));
        let h = harness_with_backend(ControllerSettings::default(), backend);
        let doomed = broken("doomed");
        let y = broken("y");
        let z = broken("z");
        h.backend.stream(y.reference_url(), "https://cdn/y");
        h.backend.stream(z.reference_url(), "https://cdn/z");
        let mut rx = h.events.subscribe();

        h.controller.enqueue(vec![ready("a"), doomed.clone(), y.clone(), z.clone()]).await;
        wait_until(|| h.backend.call_count() >= 1).await;
        assert_eq!(h.controller.remove(1).unwrap().id(), doomed.id());
        assert_eq!(h.controller.move_entry(2, 1).unwrap().id(), z.id());

        wait_until(|| y.stream_url().is_some() && z.stream_url().is_some()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let upcoming: Vec<_> = h.controller.queue_view().upcoming.iter().map(|e| e.id).collect();
        assert_eq!(upcoming, vec![z.id(), y.id()]);
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, SessionEvent::EntryDropped { .. }));
        }
    }

    #[tokio::test]
    async fn prefetch_drops_failing_entries() {
        let h = harness();
        let good = broken("good");
        h.backend.stream(good.reference_url(), "https://cdn/good");
        let bad = broken("bad");
        h.controller.enqueue(vec![ready("a"), bad.clone(), good.clone()]).await;
        wait_until(|| h.controller.queued() == 2).await;
        wait_until(|| good.stream_url().is_some()).await;
        let view = h.controller.queue_view();
        assert_eq!(view.upcoming.len(), 1);
        assert_eq!(view.upcoming[0].id, good.id());
    }

    #[tokio::test]
    async fn stop_clears_queue_and_goes_idle() {
        let h = harness();
        h.controller.enqueue(vec![ready("a"), ready("b")]).await;
        h.controller.set_loop_mode(Some(LoopMode::All));
        h.controller.stop().await.unwrap();
        wait_until(|| h.controller.player_state() == PlayerState::Idle).await;
        assert_eq!(h.controller.queued(), 0);
        assert_eq!(h.controller.queue_view().loop_mode, LoopMode::Off);
        assert_eq!(h.sink.played_urls().len(), 1);
        assert!(!h.sink.is_busy());
    }

    #[tokio::test]
    async fn pause_toggles() {
        let h = harness();
        assert_eq!(h.controller.pause().await.unwrap(), PauseState::NothingToPause);
        h.controller.enqueue(vec![ready("a")]).await;
        assert_eq!(h.controller.pause().await.unwrap(), PauseState::Paused);
        assert_eq!(h.controller.player_state(), PlayerState::Paused);
        assert_eq!(h.controller.pause().await.unwrap(), PauseState::Resumed);
        assert_eq!(h.controller.player_state(), PlayerState::Playing);
        assert_eq!(*h.sink.calls.lock().unwrap(), vec!["play", "pause", "resume"]);
    }

    #[tokio::test]
    async fn loop_toggle_switches_off_and_all() {
        let h = harness();
        assert_eq!(h.controller.set_loop_mode(None), (LoopState::Enabled, LoopMode::All));
        assert_eq!(h.controller.set_loop_mode(None), (LoopState::Disabled, LoopMode::Off));
        assert_eq!(
            h.controller.set_loop_mode(Some(LoopMode::Single)),
            (LoopState::Enabled, LoopMode::Single)
        );
        assert_eq!(h.controller.set_loop_mode(None), (LoopState::Disabled, LoopMode::Off));
    }

    #[tokio::test]
    async fn volume_is_validated_and_forwarded() {
        let h = harness();
        assert!(matches!(
            h.controller.set_volume(150).await,
            Err(CommandError::VolumeOutOfRange(150))
        ));
        assert!(matches!(h.controller.set_volume(-1).await, Err(CommandError::VolumeOutOfRange(-1))));
        h.controller.enqueue(vec![ready("a")]).await;
        assert_eq!(h.controller.set_volume(50).await.unwrap(), 50);
        assert_eq!(*h.sink.volume.lock().unwrap(), Some(0.5));
        h.controller.set_volume(10).await.unwrap();
        assert_eq!(h.controller.volume_down().await.unwrap(), 10);
        h.controller.set_volume(95).await.unwrap();
        assert_eq!(h.controller.volume_up().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn sink_failure_leaves_queue_intact() {
        let h = harness();
        h.sink.fail_next_plays(true);
        h.controller.enqueue(vec![ready("a"), ready("b")]).await;
        assert_eq!(h.controller.player_state(), PlayerState::Idle);
        assert_eq!(h.controller.queued(), 2);
        h.sink.fail_next_plays(false);
        assert!(h.controller.skip_forced().await.unwrap());
        assert_eq!(h.sink.played_urls(), vec![stream_of("b")]);
    }

    #[tokio::test]
    async fn queue_mutations_reject_current_entry() {
        let h = harness();
        h.controller.enqueue(vec![ready("a"), ready("b"), ready("c")]).await;
        assert!(matches!(h.controller.remove(0), Err(CommandError::Queue(QueueError::ZeroIndex))));
        assert!(matches!(
            h.controller.move_entry(1, 5),
            Err(CommandError::Queue(QueueError::OutOfRange))
        ));
        assert_eq!(h.controller.move_entry(2, 1).unwrap().title().as_deref(), Some("c"));
        assert_eq!(h.controller.remove(1).unwrap().title().as_deref(), Some("c"));
        h.controller.clear();
        assert_eq!(h.controller.queued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_stops_session_and_notifies() {
        let h = harness_with(ControllerSettings {
            idle_timeout: Duration::from_secs(30),
            ..ControllerSettings::default()
        });
        let mut rx = h.events.subscribe();
        h.controller.enqueue(vec![ready("a"), ready("b")]).await;
        assert_eq!(h.controller.pause().await.unwrap(), PauseState::Paused);
        tokio::time::sleep(Duration::from_secs(31)).await;
        wait_until(|| h.controller.player_state() == PlayerState::Idle).await;
        let mut timed_out = false;
        for _ in 0..50 {
            match rx.try_recv() {
                Ok(SessionEvent::IdleTimeout { .. }) => {
                    timed_out = true;
                    break;
                }
                Ok(_) => {}
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert!(timed_out);
        assert_eq!(h.controller.queued(), 0);
    }
}
