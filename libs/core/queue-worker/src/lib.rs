//! Queue Worker
//!
//! Bridges an SQS queue to an HTTP job endpoint: each message is received,
//! POSTed to the endpoint, and then deleted, left for redelivery, or moved to
//! a dead-letter queue depending on the outcome.
//!
//! ## Features
//!
//! - **Bounded pool**: `WorkerPool` keeps a fixed number of lifecycles running
//! - **Dead-letter emulation**: promote failing messages after `max_receive_count`
//!   deliveries on queue servers without native redrive (ElasticMQ)
//! - **Pluggable queue**: `QueueClient` trait with SQS and in-memory implementations
//! - **Prometheus metrics**: `received`, `success`, `error` and `response_time`
//! - **Health endpoints**: K8s-ready liveness and readiness probes
//!
//! ## Example
//!
//! ```ignore
//! use queue_worker::{HttpDispatcher, PrometheusSink, SqsQueueClient, WorkerConfig, WorkerPool};
//!
//! let config = Arc::new(WorkerConfig::from_env()?);
//! let queue = Arc::new(SqsQueueClient::from_env(None).await);
//! let dispatcher = HttpDispatcher::new(
//!     HttpDispatcher::build_client()?,
//!     &config,
//!     Arc::new(PrometheusSink::default()),
//! );
//!
//! WorkerPool::new(config, queue, Arc::new(dispatcher))
//!     .run(shutdown_rx)
//!     .await;
//! ```

mod config;
mod dispatcher;
mod error;
mod health;
mod message;
pub mod metrics;
mod pool;
pub mod queue;
mod reconciler;
mod worker;

// Re-export main types
pub use config::{
    WorkerConfig, DEFAULT_VISIBILITY_MARGIN, MAX_RECEIVE_WAIT, MAX_VISIBILITY_TIMEOUT,
};
pub use dispatcher::{
    DispatchOutcome, HttpDispatcher, JobDispatcher, MAX_BODY_SNIPPET, QUEUE_FORWARDED_HEADER,
    QUEUE_FORWARDED_VALUE,
};
pub use error::{AttributeError, DispatchError, QueueError, QueueOperation};
pub use health::{health_router, HealthState};
pub use message::{Message, RECEIVE_COUNT_ATTRIBUTE};
pub use self::metrics::{init_metrics, MetricsSink, NoopSink, PrometheusSink, RecordingSink};
pub use pool::{PoolStatus, WorkerPool, DEFAULT_ERROR_BACKOFF};
pub use queue::{InMemoryQueue, QueueCall, QueueClient, ReceiveRequest, SqsQueueClient};
pub use reconciler::{ReconcileAction, Reconciler, RetainReason};
pub use worker::{CycleOutcome, LifecycleState, Worker};
