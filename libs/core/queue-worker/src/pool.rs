//! Bounded worker pool
//!
//! The supervisor owns a `JoinSet` of `pool_size` tasks. Each task loops
//! [`Worker::run_cycle`] until shutdown, so at most `pool_size` messages are
//! ever in flight. A task that panics is replaced with a fresh worker under
//! the same id; the pool never shrinks while it is running.

use crate::config::WorkerConfig;
use crate::dispatcher::JobDispatcher;
use crate::queue::{QueueClient, ReceiveRequest};
use crate::reconciler::Reconciler;
use crate::worker::{CycleOutcome, Worker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

/// Pause after a failed receive before the same worker polls again.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Live view of the pool, shared with the health endpoints.
#[derive(Debug, Default)]
pub struct PoolStatus {
    running: AtomicBool,
    live_workers: AtomicUsize,
    cycles_completed: AtomicU64,
    respawns: AtomicU64,
}

impl PoolStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the pool is started and has at least one worker running.
    pub fn is_ready(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.live_workers() > 0
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Cycles that reached reconciliation
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    /// Workers replaced after a panic
    pub fn respawns(&self) -> u64 {
        self.respawns.load(Ordering::Relaxed)
    }
}

/// Supervisor running a fixed number of worker lifecycles
pub struct WorkerPool {
    size: usize,
    queue: Arc<dyn QueueClient>,
    dispatcher: Arc<dyn JobDispatcher>,
    reconciler: Reconciler,
    receive_request: ReceiveRequest,
    error_backoff: Duration,
    status: Arc<PoolStatus>,
}

impl WorkerPool {
    pub fn new(
        config: Arc<WorkerConfig>,
        queue: Arc<dyn QueueClient>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            size: config.pool_size.max(1),
            receive_request: ReceiveRequest::from_config(&config),
            reconciler: Reconciler::new(Arc::clone(&queue), Arc::clone(&config)),
            queue,
            dispatcher,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            status: Arc::new(PoolStatus::new()),
        }
    }

    /// Override the pause after a failed receive
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Handle for readiness checks
    pub fn status(&self) -> Arc<PoolStatus> {
        Arc::clone(&self.status)
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// In-flight cycles finish before their worker exits; no new cycle starts
    /// after the signal is observed.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            pool_size = self.size,
            queue = self.queue.name(),
            queue_url = %self.receive_request.queue_url,
            "Starting worker pool"
        );

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut worker_ids: HashMap<Id, usize> = HashMap::with_capacity(self.size);

        for worker_id in 0..self.size {
            self.spawn_worker(&mut tasks, &mut worker_ids, worker_id, shutdown.clone());
        }
        self.status.running.store(true, Ordering::Release);

        while let Some(joined) = tasks.join_next_with_id().await {
            self.status.live_workers.fetch_sub(1, Ordering::AcqRel);

            match joined {
                Ok((task_id, ())) => {
                    let worker_id = worker_ids.remove(&task_id);
                    debug!(worker_id = ?worker_id, "Worker stopped");
                }
                Err(e) => {
                    let worker_id = worker_ids.remove(&e.id());

                    if *shutdown.borrow() || !e.is_panic() {
                        warn!(worker_id = ?worker_id, error = %e, "Worker ended abnormally during shutdown");
                        continue;
                    }

                    let Some(worker_id) = worker_id else {
                        error!(error = %e, "Unknown worker task panicked");
                        continue;
                    };

                    error!(worker_id, error = %e, "Worker panicked, respawning");
                    self.status.respawns.fetch_add(1, Ordering::Relaxed);
                    self.spawn_worker(&mut tasks, &mut worker_ids, worker_id, shutdown.clone());
                }
            }
        }

        self.status.running.store(false, Ordering::Release);
        info!("Worker pool stopped");
    }

    fn spawn_worker(
        &self,
        tasks: &mut JoinSet<()>,
        worker_ids: &mut HashMap<Id, usize>,
        worker_id: usize,
        shutdown: watch::Receiver<bool>,
    ) {
        let worker = Worker::new(
            worker_id,
            Arc::clone(&self.queue),
            Arc::clone(&self.dispatcher),
            self.reconciler.clone(),
            self.receive_request.clone(),
        );

        self.status.live_workers.fetch_add(1, Ordering::AcqRel);
        let handle = tasks.spawn(run_worker(
            worker,
            shutdown,
            self.error_backoff,
            Arc::clone(&self.status),
        ));
        worker_ids.insert(handle.id(), worker_id);
    }
}

async fn run_worker(
    mut worker: Worker,
    mut shutdown: watch::Receiver<bool>,
    error_backoff: Duration,
    status: Arc<PoolStatus>,
) {
    debug!(worker_id = worker.id(), "Worker started");

    while !*shutdown.borrow() {
        match worker.run_cycle().await {
            CycleOutcome::Completed(_) => {
                status.cycles_completed.fetch_add(1, Ordering::Relaxed);
            }
            CycleOutcome::Empty => {}
            CycleOutcome::ReceiveFailed => {
                tokio::select! {
                    changed = shutdown.changed() => {
                        // A dropped sender can never signal; keep backing off.
                        if changed.is_err() {
                            tokio::time::sleep(error_backoff).await;
                        }
                    }
                    _ = tokio::time::sleep(error_backoff) => {}
                }
            }
        }
    }

    debug!(worker_id = worker.id(), "Received shutdown signal, stopping worker");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchOutcome;
    use crate::error::QueueOperation;
    use crate::message::Message;
    use crate::queue::InMemoryQueue;
    use async_trait::async_trait;

    const QUEUE: &str = "memory://jobs";

    struct Succeed;

    #[async_trait]
    impl JobDispatcher for Succeed {
        async fn dispatch(&self, _message: &Message) -> DispatchOutcome {
            DispatchOutcome::Success
        }
    }

    fn config(pool_size: usize) -> Arc<WorkerConfig> {
        Arc::new(
            WorkerConfig::new(QUEUE, "http://localhost:3000/jobs")
                .with_pool_size(pool_size)
                .with_receive_wait(Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn test_pool_status_tracks_lifecycle() {
        let queue = InMemoryQueue::new();
        let pool = WorkerPool::new(config(3), Arc::new(queue), Arc::new(Succeed));
        let status = pool.status();
        assert!(!status.is_ready());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(pool.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !status.is_ready() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(status.live_workers(), 3);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!status.is_ready());
        assert_eq!(status.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let queue = InMemoryQueue::new();
        for i in 0..10 {
            queue.push(QUEUE, format!(r#"{{"n":{i}}}"#)).await;
        }

        let pool = WorkerPool::new(config(2), Arc::new(queue.clone()), Arc::new(Succeed));
        let status = pool.status();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(pool.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.len(QUEUE).await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(status.cycles_completed(), 10);
    }

    #[tokio::test]
    async fn test_receive_errors_back_off_after_sender_dropped() {
        let queue = InMemoryQueue::new();
        queue.fail(QueueOperation::Receive).await;

        let pool = WorkerPool::new(config(1), Arc::new(queue.clone()), Arc::new(Succeed))
            .with_error_backoff(Duration::from_millis(50));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);
        let handle = tokio::spawn(pool.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(175)).await;
        handle.abort();

        let receives = queue.calls().await.len();
        assert!(
            (1..=8).contains(&receives),
            "{receives} receives in 175ms with a 50ms backoff"
        );
    }
}
