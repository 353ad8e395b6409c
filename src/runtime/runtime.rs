use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::builder::RuntimeBuilder;
use super::signal;
use crate::config::Config;
use crate::context::{Context, ContextManager};
use crate::error::{JobError, RuntimeError};
use crate::events::EventBus;
use crate::jobs::{Dispatched, Dispatcher, Job, JobWorker, MemoryQueue};
use crate::pool::TaskPool;

/// Every component wired from one [`Config`].
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use worklane::{Config, Context, Runtime, TaskError};
/// use worklane::jobs::{Dispatched, Job, ShouldQueue};
///
/// struct Resize(u32);
///
/// #[async_trait]
/// impl Job for Resize {
///     fn name(&self) -> &str { "resize" }
///     async fn handle(&self, _ctx: Context) -> Result<(), TaskError> { Ok(()) }
///     fn should_queue(&self) -> Option<ShouldQueue> { Some(ShouldQueue::default()) }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut cfg = Config::default();
/// cfg.pool.num_workers = 2;
/// let rt = Runtime::<String, Resize>::builder(cfg).build().unwrap();
/// rt.start();
///
/// let out = rt.dispatch(&Context::background(), Resize(640)).await.unwrap();
/// assert!(matches!(out, Dispatched::Queued { .. }));
/// rt.shutdown().await.unwrap();
/// # }
/// ```
pub struct Runtime<E, J> {
    pub(crate) cfg: Config,
    pub(crate) pool: TaskPool,
    pub(crate) contexts: ContextManager,
    pub(crate) events: EventBus<E>,
    pub(crate) queue: Arc<MemoryQueue<J>>,
    pub(crate) dispatcher: Dispatcher<J>,
    pub(crate) worker: JobWorker<J>,
}

impl<E, J> Runtime<E, J>
where
    E: Clone + Send + Sync + 'static,
    J: Job,
{
    pub fn builder(cfg: Config) -> RuntimeBuilder<E, J> {
        RuntimeBuilder::new(cfg)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn events(&self) -> &EventBus<E> {
        &self.events
    }

    pub fn queue(&self) -> &Arc<MemoryQueue<J>> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Dispatcher<J> {
        &self.dispatcher
    }

    pub fn worker(&self) -> &JobWorker<J> {
        &self.worker
    }

    /// Shorthand for [`Dispatcher::dispatch`].
    pub async fn dispatch(&self, ctx: &Context, job: J) -> Result<Dispatched, JobError> {
        self.dispatcher.dispatch(ctx, job).await
    }

    /// Starts consuming queued jobs.
    pub fn start(&self) {
        self.worker.start();
    }

    /// Stops job intake, lets in-flight jobs settle, then drains the pool.
    ///
    /// The configured grace bounds the whole sequence. Pending jobs that were
    /// never picked up stay in the queue.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        tracing::info!("runtime shutting down");
        self.queue.close();

        let Some(grace) = self.cfg.shutdown_grace() else {
            self.worker.stop().await;
            self.pool.shutdown().await;
            tracing::info!("runtime stopped");
            return Ok(());
        };

        let started = Instant::now();
        if tokio::time::timeout(grace, self.worker.stop()).await.is_err() {
            tracing::warn!(?grace, "job worker did not settle within grace");
        }
        let left = grace.saturating_sub(started.elapsed()).max(Duration::from_millis(1));
        let res = self.pool.shutdown_with_grace(left).await;
        match &res {
            Ok(()) => tracing::info!("runtime stopped"),
            Err(e) => tracing::warn!(error = %e, "runtime stopped with stuck workers"),
        }
        res.map_err(|e| match e {
            RuntimeError::GraceExceeded { stuck, .. } => RuntimeError::GraceExceeded { grace, stuck },
        })
    }

    /// Starts job workers, waits for a termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        self.start();
        if let Err(e) = signal::terminated().await {
            tracing::error!(error = %e, "cannot listen for termination signals; shutting down");
        }
        self.shutdown().await
    }
}

impl<E, J> std::fmt::Debug for Runtime<E, J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pool", &self.pool)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::events::EventStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tick(Arc<AtomicUsize>);

    #[async_trait]
    impl Job for Tick {
        fn name(&self) -> &str {
            "tick"
        }

        async fn handle(&self, _ctx: Context) -> Result<(), TaskError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn should_queue(&self) -> Option<crate::jobs::ShouldQueue> {
            Some(Default::default())
        }
    }

    fn cfg() -> Config {
        let mut cfg = Config::default();
        cfg.pool.num_workers = 2;
        cfg.pool.idle_timeout_ms = 5;
        cfg.events.event_store_enabled = true;
        cfg.shutdown_grace_ms = 2_000;
        cfg
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_jobs_run_after_start() {
        let rt = Runtime::<u8, Tick>::builder(cfg()).build().unwrap();
        rt.start();

        let hits = Arc::new(AtomicUsize::new(0));
        let ctx = Context::background();
        for _ in 0..5 {
            rt.dispatch(&ctx, Tick(hits.clone())).await.unwrap();
        }
        for _ in 0..200 {
            if rt.worker().metrics().succeeded == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        rt.shutdown().await.unwrap();
        assert!(!rt.pool().is_accepting());
    }

    #[tokio::test]
    async fn configured_store_is_attached() {
        let rt = Runtime::<u8, Tick>::builder(cfg()).build().unwrap();
        rt.events()
            .dispatch_event(&Context::background(), "boot", 1)
            .await
            .unwrap();
        let store = rt.events().store().expect("store enabled in config");
        assert_eq!(store.count().await.unwrap(), 1);
        rt.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_refused() {
        let rt = Runtime::<u8, Tick>::builder(cfg()).build().unwrap();
        rt.shutdown().await.unwrap();
        let err = rt
            .dispatch(&Context::background(), Tick(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "queue_closed");
    }
}
