use std::marker::PhantomData;
use std::sync::Arc;

use super::runtime::Runtime;
use crate::config::Config;
use crate::context::ContextManager;
use crate::error::ConfigError;
use crate::events::{EventBus, EventStore, MemoryEventStore};
use crate::jobs::{Dispatcher, Job, JobWorker, MemoryQueue, Queue};
use crate::pool::TaskPool;

/// Assembles a [`Runtime`] from a [`Config`].
///
/// `E` is the event payload type, `J` the job type.
pub struct RuntimeBuilder<E, J> {
    cfg: Config,
    event_store: Option<Arc<dyn EventStore<E>>>,
    _jobs: PhantomData<fn() -> J>,
}

impl<E, J> RuntimeBuilder<E, J>
where
    E: Clone + Send + Sync + 'static,
    J: Job,
{
    pub(crate) fn new(cfg: Config) -> Self {
        Self {
            cfg,
            event_store: None,
            _jobs: PhantomData,
        }
    }

    /// Persists events to `store` instead of the configured in-memory store.
    pub fn with_event_store(mut self, store: Arc<dyn EventStore<E>>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Validates the config and starts the task pool.
    ///
    /// Must be called from inside a tokio runtime. Job workers start with
    /// [`Runtime::start`].
    pub fn build(self) -> Result<Runtime<E, J>, ConfigError> {
        let cfg = self.cfg;
        cfg.validate()?;

        let pool = TaskPool::new(cfg.pool.clone())?;
        let contexts = ContextManager::new(cfg.context.clone());

        let store = self.event_store.or_else(|| {
            cfg.events.event_store_enabled.then(|| {
                Arc::new(MemoryEventStore::<E>::with_capacity(cfg.events.event_store_capacity))
                    as Arc<dyn EventStore<E>>
            })
        });
        let events = match store {
            Some(store) => EventBus::with_store(cfg.events.clone(), pool.clone(), store),
            None => EventBus::new(cfg.events.clone(), pool.clone()),
        };

        let queue = Arc::new(MemoryQueue::<J>::new(cfg.queue.capacity, cfg.queue.failed_capacity));
        let shared: Arc<dyn Queue<J>> = queue.clone();
        let dispatcher = Dispatcher::new(cfg.queue.clone(), Arc::clone(&shared), contexts.clone());
        let worker = JobWorker::new(cfg.queue.clone(), shared, pool.clone(), contexts.clone());

        tracing::info!(
            workers = pool.worker_count(),
            driver = ?cfg.queue.driver,
            store = events.store().is_some(),
            "runtime built"
        );
        Ok(Runtime {
            cfg,
            pool,
            contexts,
            events,
            queue,
            dispatcher,
            worker,
        })
    }
}
