//! Cancellable idle countdown, one per session.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

pub(crate) struct IdleTimer {
    timeout: Option<Duration>,
    handle: Mutex<Option<JoinHandle<()>>>,
    triggered: Arc<AtomicBool>,
}

impl IdleTimer {
    /// A zero timeout disables the timer.
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout: (!timeout.is_zero()).then_some(timeout),
            handle: Mutex::new(None),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// (Re)start the countdown; `on_expire` runs if it is not cancelled in time.
    pub(crate) fn start<F>(&self, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(timeout) = self.timeout else {
            return;
        };
        self.triggered.store(false, Ordering::SeqCst);
        let triggered = self.triggered.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            triggered.store(true, Ordering::SeqCst);
            // Detached so the handler may cancel or restart this timer.
            tokio::spawn(on_expire);
        });
        let previous = self
            .handle
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the countdown and clear the expired flag.
    pub(crate) fn cancel(&self) {
        self.triggered.store(false, Ordering::SeqCst);
        let previous = self.handle.lock().unwrap_or_else(|err| err.into_inner()).take();
        if let Some(previous) = previous {
            if !previous.is_finished() {
                previous.abort();
            }
        }
    }

    /// Whether the last countdown ran to completion and was not cancelled since.
    pub(crate) fn triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
