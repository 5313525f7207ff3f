//! Playback sink that drives a remote audio bridge over HTTP.
//!
//! Control calls are blocking `ureq` requests moved onto the blocking pool.
//! End of playback is detected by polling `/status`: once the bridge has been
//! seen playing our stream, any other report means the stream is over.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use audio_queue_types::BridgeStatus;

use crate::playback_sink::{FinishedCallback, PlayRequest, PlaybackSink, SinkError};

const STATUS_FAILURES_BEFORE_GIVING_UP: u32 = 5;
const START_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, serde::Serialize)]
struct HttpPlayRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    volume_percent: u8,
}

#[derive(Debug, serde::Serialize)]
struct HttpVolumeRequest {
    percent: u8,
}

/// Blocking HTTP client for one bridge.
#[derive(Clone)]
pub(crate) struct BridgeClient {
    http_addr: SocketAddr,
}

impl BridgeClient {
    pub(crate) fn new(http_addr: SocketAddr) -> Self {
        Self { http_addr }
    }

    /// Fetch the current bridge status snapshot.
    pub(crate) fn status(&self) -> Result<BridgeStatus> {
        let url = format!("http://{}/status", self.http_addr);
        let mut resp = ureq::get(&url)
            .config()
            .timeout_per_call(Some(Duration::from_secs(2)))
            .build()
            .call()
            .map_err(|e| anyhow::anyhow!("http status request failed: {e}"))?;
        let status: BridgeStatus = resp
            .body_mut()
            .read_json()
            .map_err(|e| anyhow::anyhow!("http status decode failed: {e}"))?;
        Ok(status)
    }

    /// Ask the bridge to fetch and play a stream URL.
    pub(crate) fn play(&self, url: &str, title: Option<&str>, volume_percent: u8) -> Result<()> {
        let payload = HttpPlayRequest {
            url,
            title,
            volume_percent,
        };
        self.post("play", payload, Duration::from_secs(3))
    }

    pub(crate) fn pause(&self) -> Result<()> {
        self.post("pause", serde_json::json!({}), Duration::from_secs(2))
    }

    pub(crate) fn resume(&self) -> Result<()> {
        self.post("resume", serde_json::json!({}), Duration::from_secs(2))
    }

    pub(crate) fn stop(&self) -> Result<()> {
        self.post("stop", serde_json::json!({}), Duration::from_secs(2))
    }

    pub(crate) fn set_volume(&self, percent: u8) -> Result<()> {
        self.post("volume", HttpVolumeRequest { percent }, Duration::from_secs(2))
    }

    fn post(&self, endpoint: &str, payload: impl serde::Serialize, timeout: Duration) -> Result<()> {
        let url = format!("http://{}/{endpoint}", self.http_addr);
        ureq::post(&url)
            .config()
            .timeout_per_call(Some(timeout))
            .build()
            .send_json(payload)
            .map_err(|e| anyhow::anyhow!("http {endpoint} failed: {e}"))?;
        Ok(())
    }
}

struct ActiveStream {
    generation: u64,
    stream_url: String,
    on_finished: FinishedCallback,
    started: bool,
    failures: u32,
    waited: Duration,
}

impl ActiveStream {
    /// Fold one status poll into the stream state. Returns `true` once it is over.
    fn observe(&mut self, status: Option<&BridgeStatus>, interval: Duration) -> bool {
        let Some(status) = status else {
            self.failures += 1;
            return self.failures >= STATUS_FAILURES_BEFORE_GIVING_UP;
        };
        self.failures = 0;
        if status.now_playing.as_deref() == Some(self.stream_url.as_str()) {
            self.started = true;
            return false;
        }
        if self.started {
            return true;
        }
        self.waited += interval;
        self.waited >= START_TIMEOUT
    }
}

#[derive(Default)]
struct SinkState {
    generation: u64,
    active: Option<ActiveStream>,
}

pub(crate) struct BridgeSink {
    id: String,
    client: BridgeClient,
    poll_interval: Duration,
    state: Arc<Mutex<SinkState>>,
}

impl BridgeSink {
    pub(crate) fn new(id: impl Into<String>, http_addr: SocketAddr, poll_interval: Duration) -> Self {
        Self {
            id: id.into(),
            client: BridgeClient::new(http_addr),
            poll_interval,
            state: Arc::new(Mutex::new(SinkState::default())),
        }
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, SinkError>
    where
        T: Send + 'static,
        F: FnOnce(&BridgeClient) -> Result<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || call(&client))
            .await
            .map_err(|e| SinkError::Offline(e.to_string()))?
            .map_err(|e| SinkError::Offline(e.to_string()))
    }

    fn take_active(&self) -> Option<ActiveStream> {
        self.state.lock().unwrap_or_else(|err| err.into_inner()).active.take()
    }

    fn spawn_watcher(&self, generation: u64) {
        let state = self.state.clone();
        let client = self.client.clone();
        let interval = self.poll_interval;
        let sink_id = self.id.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let poll_client = client.clone();
                let status = tokio::task::spawn_blocking(move || poll_client.status())
                    .await
                    .ok()
                    .and_then(|res| res.ok());
                let finished = {
                    let mut guard = state.lock().unwrap_or_else(|err| err.into_inner());
                    let Some(active) = guard.active.as_mut().filter(|a| a.generation == generation) else {
                        return;
                    };
                    if active.observe(status.as_ref(), interval) {
                        guard.active.take()
                    } else {
                        None
                    }
                };
                if let Some(done) = finished {
                    tracing::debug!(sink = %sink_id, generation, started = done.started, "bridge stream finished");
                    (done.on_finished)();
                    return;
                }
            }
        });
    }
}

#[async_trait]
impl PlaybackSink for BridgeSink {
    async fn play(&self, request: PlayRequest, on_finished: FinishedCallback) -> Result<(), SinkError> {
        let (generation, replaced) = {
            let mut guard = self.state.lock().unwrap_or_else(|err| err.into_inner());
            guard.generation += 1;
            (guard.generation, guard.active.take())
        };
        if let Some(replaced) = replaced {
            (replaced.on_finished)();
        }

        let url = request.stream_url.clone();
        let title = request.title.clone();
        let percent = (request.volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.blocking(move |client| client.play(&url, Some(&title), percent))
            .await?;
        tracing::info!(sink = %self.id, title = %request.title, "bridge playback started");

        {
            let mut guard = self.state.lock().unwrap_or_else(|err| err.into_inner());
            if guard.generation != generation {
                // A newer play raced ahead; this stream is already superseded.
                drop(guard);
                on_finished();
                return Ok(());
            }
            guard.active = Some(ActiveStream {
                generation,
                stream_url: request.stream_url,
                on_finished,
                started: false,
                failures: 0,
                waited: Duration::ZERO,
            });
        }
        self.spawn_watcher(generation);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.blocking(|client| client.pause()).await
    }

    async fn resume(&self) -> Result<(), SinkError> {
        self.blocking(|client| client.resume()).await
    }

    async fn stop(&self) -> Result<(), SinkError> {
        let active = self.take_active();
        let result = self.blocking(|client| client.stop()).await;
        if let Some(active) = active {
            (active.on_finished)();
        }
        result
    }

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.blocking(move |client| client.set_volume(percent)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn active(url: &str) -> ActiveStream {
        ActiveStream {
            generation: 1,
            stream_url: url.to_string(),
            on_finished: Box::new(|| {}),
            started: false,
            failures: 0,
            waited: Duration::ZERO,
        }
    }

    fn playing(url: Option<&str>) -> BridgeStatus {
        BridgeStatus {
            now_playing: url.map(str::to_string),
            ..BridgeStatus::default()
        }
    }

    #[test]
    fn stream_ends_after_it_was_seen_playing() {
        let mut stream = active("https://cdn/a");
        let tick = Duration::from_millis(500);
        assert!(!stream.observe(Some(&playing(None)), tick));
        assert!(!stream.observe(Some(&playing(Some("https://cdn/a"))), tick));
        assert!(stream.observe(Some(&playing(None)), tick));
    }

    #[test]
    fn stream_that_never_starts_times_out() {
        let mut stream = active("https://cdn/a");
        let tick = Duration::from_secs(10);
        assert!(!stream.observe(Some(&playing(Some("https://cdn/other"))), tick));
        assert!(!stream.observe(Some(&playing(None)), tick));
        assert!(stream.observe(Some(&playing(None)), tick));
    }

    #[test]
    fn repeated_status_failures_end_the_stream() {
        let mut stream = active("https://cdn/a");
        let tick = Duration::from_millis(500);
        for _ in 1..STATUS_FAILURES_BEFORE_GIVING_UP {
            assert!(!stream.observe(None, tick));
        }
        assert!(stream.observe(None, tick));
    }

    #[tokio::test]
    async fn unreachable_bridge_rejects_play_without_callback() {
        let sink = BridgeSink::new("test", "127.0.0.1:1".parse().unwrap(), Duration::from_millis(50));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let request = PlayRequest {
            stream_url: "https://cdn/a".to_string(),
            title: "A".to_string(),
            reference_url: "https://page/a".to_string(),
            volume: 1.0,
        };
        let result = sink
            .play(request, Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        assert!(matches!(result, Err(SinkError::Offline(_))));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
