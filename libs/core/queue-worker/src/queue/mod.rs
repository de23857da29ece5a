//! Queue client abstraction
//!
//! The worker only needs three calls from the queue service. Implementations
//! must be safe to share across every lifecycle in the pool without extra
//! locking.

pub mod memory;
pub mod sqs;

pub use memory::{InMemoryQueue, QueueCall};
pub use sqs::SqsQueueClient;

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::message::{Message, RECEIVE_COUNT_ATTRIBUTE};
use async_trait::async_trait;
use std::time::Duration;

/// Parameters for a single long-poll receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Queue to receive from
    pub queue_url: String,
    /// Maximum time the call may block waiting for a message
    pub wait: Duration,
    /// How long a received message stays hidden from other consumers
    pub visibility_timeout: Duration,
    /// System attributes to return with the message
    pub attribute_names: Vec<String>,
}

impl ReceiveRequest {
    /// Receive parameters derived from the worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            queue_url: config.queue_url.clone(),
            wait: config.receive_wait,
            visibility_timeout: config.visibility_timeout(),
            attribute_names: vec![RECEIVE_COUNT_ATTRIBUTE.to_string()],
        }
    }
}

/// Queue operations used by the worker.
///
/// `receive` always asks for at most one message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for one message. `Ok(None)` means the wait elapsed empty.
    async fn receive(&self, request: &ReceiveRequest) -> Result<Option<Message>, QueueError>;

    /// Delete a delivery by receipt handle.
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;

    /// Send a new message with the given body.
    async fn send(&self, queue_url: &str, body: &str) -> Result<(), QueueError>;

    /// Client name for logging.
    fn name(&self) -> &'static str;
}
