//! Fixed-size worker pools that run task bodies off the coordinating thread

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::core::{Error, Result};
use crate::services::Services;
use crate::task::TaskOutput;

/// A rayon thread pool plus the services its jobs run against
pub struct WorkerPool {
    name: String,
    size: usize,
    pool: rayon::ThreadPool,
    services: Arc<Services>,
}

impl WorkerPool {
    /// Build a pool of `size` threads named `<name>-<n>`.
    pub fn new(name: &str, size: usize, services: Arc<Services>) -> Result<Self> {
        if size == 0 {
            return Err(Error::WorkerPool(format!("{name} pool needs at least one worker")));
        }

        let thread_prefix = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(move |i| format!("{thread_prefix}-{i}"))
            .panic_handler(|payload| log::error!("Worker panic escaped its job: {}", panic_message(payload.as_ref())))
            .build()
            .map_err(|e| Error::WorkerPool(format!("{name} pool: {e}")))?;

        log::debug!("Started {name} pool with {size} workers");
        Ok(Self {
            name: name.to_string(),
            size,
            pool,
            services,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Queue `job` on a worker; the result is collected with [`PendingResult::try_take`].
    ///
    /// A panicking job yields [`Error::WorkerPanicked`].
    pub fn submit<F>(&self, job: F) -> PendingResult
    where
        F: FnOnce(&Services) -> Result<TaskOutput> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let services = Arc::clone(&self.services);
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| job(&services)))
                .unwrap_or_else(|payload| Err(Error::WorkerPanicked(panic_message(payload.as_ref()))));
            // Receiver gone means nobody wants the result any more
            let _ = tx.send(result);
        });
        PendingResult { rx }
    }
}

/// Result slot of a submitted job
#[derive(Debug)]
pub struct PendingResult {
    rx: oneshot::Receiver<Result<TaskOutput>>,
}

impl PendingResult {
    /// The job's result if it has finished. Never blocks.
    pub fn try_take(&mut self) -> Option<Result<TaskOutput>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(Error::WorkerLost)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryContentStore;
    use crate::test_support::TestEnv;
    use std::time::{Duration, Instant};

    fn services() -> (TestEnv, Arc<Services>) {
        let env = TestEnv::new(MemoryContentStore::new().with_object("h", b"bytes".to_vec()));
        let services = Arc::new(env.services_with(Arc::new(crate::services::PassthroughMaterializer)));
        (env, services)
    }

    fn wait(pending: &mut PendingResult) -> Result<TaskOutput> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(result) = pending.try_take() {
                return result;
            }
            assert!(Instant::now() < deadline, "job never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let (_env, services) = services();
        assert!(matches!(WorkerPool::new("download", 0, services), Err(Error::WorkerPool(_))));
    }

    #[test]
    fn test_job_result() {
        let (_env, services) = services();
        let pool = WorkerPool::new("download", 2, services).unwrap();
        assert_eq!(pool.size(), 2);

        let mut pending = pool.submit(|services| {
            let bytes = services.fetcher.fetch("h", None)?;
            Ok(TaskOutput::Texture(bytes))
        });
        match wait(&mut pending) {
            Ok(TaskOutput::Texture(bytes)) => assert_eq!(bytes, b"bytes"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_panic_becomes_error() {
        let (_env, services) = services();
        let pool = WorkerPool::new("materialize", 1, services).unwrap();

        let mut pending = pool.submit(|_| panic!("boom"));
        assert!(matches!(wait(&mut pending), Err(Error::WorkerPanicked(msg)) if msg == "boom"));

        // The worker survives
        let mut pending = pool.submit(|_| Ok(TaskOutput::Texture(Vec::new())));
        assert!(wait(&mut pending).is_ok());
    }
}
