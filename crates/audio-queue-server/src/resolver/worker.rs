//! Single background thread that owns all blocking backend calls.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};

use super::backend::{ClientCache, ExtractBackend, ExtractError, ExtractOptions, ExtractedInfo};

type Job = Box<dyn FnOnce(&ResolverContext) + Send>;

/// State shared by every job on the worker: the backend and its client cache.
pub(crate) struct ResolverContext {
    backend: Arc<dyn ExtractBackend>,
    clients: ClientCache,
}

impl ResolverContext {
    pub(crate) fn new(backend: Arc<dyn ExtractBackend>) -> Self {
        Self {
            backend,
            clients: ClientCache::default(),
        }
    }

    pub(crate) fn extract(
        &self,
        reference: &str,
        options: &ExtractOptions,
    ) -> Result<ExtractedInfo, ExtractError> {
        let client = self.clients.get_or_create(self.backend.as_ref(), options);
        client.extract(reference)
    }

    pub(crate) fn probe(&self) -> Result<String, ExtractError> {
        self.backend.probe()
    }

    #[cfg(test)]
    pub(crate) fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Handle for submitting jobs to the resolver worker thread.
#[derive(Clone)]
pub(crate) struct ResolverWorker {
    job_tx: Sender<Job>,
}

impl ResolverWorker {
    /// Spawn the worker thread.
    pub(crate) fn spawn(context: ResolverContext) -> Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("resolver-worker".to_string())
            .spawn(move || worker_main(context, job_rx))
            .context("spawn resolver worker")?;
        Ok(Self { job_tx })
    }

    /// Run `job` on the worker and await its result.
    pub(crate) async fn run<T, F>(&self, job: F) -> Result<T, ExtractError>
    where
        T: Send + 'static,
        F: FnOnce(&ResolverContext) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.job_tx
            .send(Box::new(move |ctx: &ResolverContext| {
                let _ = reply_tx.send(job(ctx));
            }))
            .map_err(|_| ExtractError::Unexpected("resolver worker stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ExtractError::Unexpected("resolver worker dropped the job".to_string()))
    }

    /// Block until the worker has run the backend probe once.
    pub(crate) fn warm_up(&self) -> Result<String> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.job_tx
            .send(Box::new(move |ctx: &ResolverContext| {
                let _ = reply_tx.send(ctx.probe());
            }))
            .map_err(|_| anyhow!("resolver worker stopped"))?;
        let version = reply_rx
            .recv()
            .map_err(|_| anyhow!("resolver worker dropped the warm-up probe"))?
            .context("probe extraction backend")?;
        Ok(version)
    }
}

fn worker_main(context: ResolverContext, job_rx: Receiver<Job>) {
    while let Ok(job) = job_rx.recv() {
        job(&context);
    }
    tracing::debug!("resolver worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::backend::ExtractClient;

    struct EchoClient;

    impl ExtractClient for EchoClient {
        fn extract(&self, reference: &str) -> Result<ExtractedInfo, ExtractError> {
            Ok(ExtractedInfo {
                title: Some(reference.to_string()),
                ..ExtractedInfo::default()
            })
        }
    }

    struct EchoBackend;

    impl ExtractBackend for EchoBackend {
        fn client(&self, _options: &ExtractOptions) -> Arc<dyn ExtractClient> {
            Arc::new(EchoClient)
        }

        fn probe(&self) -> Result<String, ExtractError> {
            Ok("echo 1.0".to_string())
        }
    }

    #[tokio::test]
    async fn jobs_run_on_the_worker_thread() {
        let worker = ResolverWorker::spawn(ResolverContext::new(Arc::new(EchoBackend))).unwrap();
        assert_eq!(worker.warm_up().unwrap(), "echo 1.0");
        let name = worker
            .run(|_| std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("resolver-worker"));
        let info = worker
            .run(|ctx| ctx.extract("abc", &ExtractOptions::default()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.title.as_deref(), Some("abc"));
        let cached = worker
            .run(|ctx| {
                let _ = ctx.extract("def", &ExtractOptions::default());
                ctx.cached_clients()
            })
            .await
            .unwrap();
        assert_eq!(cached, 1);
    }
}
