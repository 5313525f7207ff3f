//! Playback sink abstraction.
//!
//! A sink plays one stream at a time. Every successful `play` hands over a
//! finished callback that the sink invokes exactly once: when the stream
//! ends, when it is stopped, or when a newer `play` replaces it.

use async_trait::async_trait;

/// Invoked once when the stream started by `play` is over.
pub type FinishedCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub stream_url: String,
    pub title: String,
    pub reference_url: String,
    /// Linear gain in `0.0..=1.0`.
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("playback output offline: {0}")]
    Offline(String),
    #[error("playback output rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Start `request`. On error the callback is dropped without being called.
    async fn play(&self, request: PlayRequest, on_finished: FinishedCallback) -> Result<(), SinkError>;
    async fn pause(&self) -> Result<(), SinkError>;
    async fn resume(&self) -> Result<(), SinkError>;
    /// Stop the current stream, firing its finished callback.
    async fn stop(&self) -> Result<(), SinkError>;
    async fn set_volume(&self, volume: f32) -> Result<(), SinkError>;
}

/// Convert a 0..=100 percentage into the gain sinks expect.
pub fn gain_from_percent(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording sink used by controller tests.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) played: Mutex<Vec<PlayRequest>>,
        pub(crate) calls: Mutex<Vec<&'static str>>,
        pub(crate) volume: Mutex<Option<f32>>,
        current: Mutex<Option<FinishedCallback>>,
        fail_play: Mutex<bool>,
    }

    impl RecordingSink {
        pub(crate) fn fail_next_plays(&self, fail: bool) {
            *self.fail_play.lock().unwrap() = fail;
        }

        /// Simulate the stream reaching its natural end.
        pub(crate) fn finish_current(&self) -> bool {
            let callback = self.current.lock().unwrap().take();
            match callback {
                Some(callback) => {
                    callback();
                    true
                }
                None => false,
            }
        }

        pub(crate) fn played_urls(&self) -> Vec<String> {
            self.played
                .lock()
                .unwrap()
                .iter()
                .map(|req| req.stream_url.clone())
                .collect()
        }

        pub(crate) fn is_busy(&self) -> bool {
            self.current.lock().unwrap().is_some()
        }
    }

    #[async_trait]
    impl PlaybackSink for RecordingSink {
        async fn play(&self, request: PlayRequest, on_finished: FinishedCallback) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("play");
            if *self.fail_play.lock().unwrap() {
                return Err(SinkError::Offline("test".to_string()));
            }
            let previous = self.current.lock().unwrap().replace(on_finished);
            if let Some(previous) = previous {
                previous();
            }
            self.played.lock().unwrap().push(request);
            Ok(())
        }

        async fn pause(&self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("pause");
            Ok(())
        }

        async fn resume(&self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("resume");
            Ok(())
        }

        async fn stop(&self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("stop");
            self.finish_current();
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
            *self.volume.lock().unwrap() = Some(volume);
            Ok(())
        }
    }
}
