//! In-memory queue for tests and local runs
//!
//! Models the SQS behaviours the worker depends on:
//! - visibility timeouts hide a received message from other receivers
//! - every receive bumps `ApproximateReceiveCount` and issues a fresh receipt handle
//! - delete with a stale receipt handle fails
//! - receives long-poll until a message is sent or the wait elapses
//!
//! Every call is recorded so tests can assert on exact side effects.

use super::{QueueClient, ReceiveRequest};
use crate::error::{QueueError, QueueOperation};
use crate::message::{Message, RECEIVE_COUNT_ATTRIBUTE};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

/// A call made against the in-memory queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCall {
    Receive { queue_url: String },
    Delete { queue_url: String, receipt_handle: String },
    Send { queue_url: String, body: String },
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    receipt_handle: Option<String>,
    invisible_until: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, Vec<StoredMessage>>,
    calls: Vec<QueueCall>,
    failing: HashSet<FailureKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FailureKey {
    operation: QueueOperation,
    queue_url: Option<String>,
}

impl State {
    fn is_failing(&self, operation: QueueOperation, queue_url: &str) -> bool {
        self.failing.contains(&FailureKey { operation, queue_url: None })
            || self.failing.contains(&FailureKey {
                operation,
                queue_url: Some(queue_url.to_string()),
            })
    }
}

/// Thread-safe in-memory queue holding any number of named queues
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
    arrivals: Arc<Notify>,
}

impl InMemoryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message without recording a `Send` call.
    pub async fn push(&self, queue_url: &str, body: impl Into<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue_url.to_string())
            .or_default()
            .push(StoredMessage {
                message_id: message_id.clone(),
                body: body.into(),
                receive_count: 0,
                receipt_handle: None,
                invisible_until: None,
            });
        drop(state);
        self.arrivals.notify_waiters();
        message_id
    }

    /// Make every call of `operation` fail, on any queue.
    pub async fn fail(&self, operation: QueueOperation) {
        self.state.lock().await.failing.insert(FailureKey {
            operation,
            queue_url: None,
        });
    }

    /// Make `operation` fail only against `queue_url`.
    pub async fn fail_on(&self, operation: QueueOperation, queue_url: &str) {
        self.state.lock().await.failing.insert(FailureKey {
            operation,
            queue_url: Some(queue_url.to_string()),
        });
    }

    /// Clear all injected failures
    pub async fn heal(&self) {
        self.state.lock().await.failing.clear();
    }

    /// Force every message in `queue_url` visible again, as if the visibility
    /// timeout had elapsed.
    pub async fn expire_visibility(&self, queue_url: &str) {
        let mut state = self.state.lock().await;
        if let Some(messages) = state.queues.get_mut(queue_url) {
            for message in messages.iter_mut() {
                message.invisible_until = None;
            }
        }
        drop(state);
        self.arrivals.notify_waiters();
    }

    /// Bodies currently stored in `queue_url`, visible or not
    pub async fn bodies(&self, queue_url: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .queues
            .get(queue_url)
            .map(|messages| messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of messages stored in `queue_url`
    pub async fn len(&self, queue_url: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue_url)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// All recorded calls, in order
    pub async fn calls(&self) -> Vec<QueueCall> {
        self.state.lock().await.calls.clone()
    }

    /// Recorded calls other than receives
    pub async fn mutations(&self) -> Vec<QueueCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| !matches!(call, QueueCall::Receive { .. }))
            .collect()
    }

    async fn try_receive(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Option<Message>, QueueError> {
        let mut state = self.state.lock().await;

        if state.is_failing(QueueOperation::Receive, &request.queue_url) {
            return Err(QueueError::receive(format!(
                "injected failure for {}",
                request.queue_url
            )));
        }

        let now = Instant::now();
        let Some(messages) = state.queues.get_mut(&request.queue_url) else {
            return Ok(None);
        };

        let Some(stored) = messages
            .iter_mut()
            .find(|m| m.invisible_until.is_none_or(|until| until <= now))
        else {
            return Ok(None);
        };

        let receipt_handle = Uuid::new_v4().to_string();
        stored.receive_count += 1;
        stored.receipt_handle = Some(receipt_handle.clone());
        stored.invisible_until = Some(now + request.visibility_timeout);

        let mut message = Message::new(receipt_handle, stored.body.clone())
            .with_message_id(stored.message_id.clone());
        if request
            .attribute_names
            .iter()
            .any(|name| name == RECEIVE_COUNT_ATTRIBUTE)
        {
            message = message.with_receive_count(stored.receive_count);
        }

        Ok(Some(message))
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Option<Message>, QueueError> {
        self.state.lock().await.calls.push(QueueCall::Receive {
            queue_url: request.queue_url.clone(),
        });

        let deadline = Instant::now() + request.wait;

        loop {
            // Register interest before checking so a concurrent push is not missed.
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(message) = self.try_receive(request).await? {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.calls.push(QueueCall::Delete {
            queue_url: queue_url.to_string(),
            receipt_handle: receipt_handle.to_string(),
        });

        if state.is_failing(QueueOperation::Delete, queue_url) {
            return Err(QueueError::delete(format!("injected failure for {}", queue_url)));
        }

        let messages = state
            .queues
            .get_mut(queue_url)
            .ok_or_else(|| QueueError::delete(format!("queue {} does not exist", queue_url)))?;

        let position = messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| {
                QueueError::delete(format!("receipt handle {} is invalid", receipt_handle))
            })?;

        messages.remove(position);
        Ok(())
    }

    async fn send(&self, queue_url: &str, body: &str) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            state.calls.push(QueueCall::Send {
                queue_url: queue_url.to_string(),
                body: body.to_string(),
            });

            if state.is_failing(QueueOperation::Send, queue_url) {
                return Err(QueueError::send(format!("injected failure for {}", queue_url)));
            }
        }

        self.push(queue_url, body).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
