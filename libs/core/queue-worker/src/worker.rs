//! Single message lifecycle
//!
//! `Idle -> Receiving -> Dispatching -> Reconciling -> Idle`. An empty or
//! failed receive goes straight back to `Idle`. Nothing in a cycle is allowed
//! to end the worker; the pool simply issues the next one.

use crate::dispatcher::{DispatchOutcome, JobDispatcher};
use crate::queue::{QueueClient, ReceiveRequest};
use crate::reconciler::Reconciler;
use std::sync::Arc;
use strum::Display;
use tracing::{debug, error};

/// Where a worker is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Receiving,
    Dispatching,
    Reconciling,
}

/// How a cycle ended. Informational only; the queue already reflects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The long-poll elapsed without a message
    Empty,
    /// The receive call itself failed
    ReceiveFailed,
    /// A message was dispatched and reconciled
    Completed(DispatchOutcome),
}

/// One receive -> dispatch -> reconcile loop body
pub struct Worker {
    id: usize,
    state: LifecycleState,
    queue: Arc<dyn QueueClient>,
    dispatcher: Arc<dyn JobDispatcher>,
    reconciler: Reconciler,
    receive_request: ReceiveRequest,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn QueueClient>,
        dispatcher: Arc<dyn JobDispatcher>,
        reconciler: Reconciler,
        receive_request: ReceiveRequest,
    ) -> Self {
        Self {
            id,
            state: LifecycleState::Idle,
            queue,
            dispatcher,
            reconciler,
            receive_request,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Run one full cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.transition(LifecycleState::Receiving);

        let message = match self.queue.receive(&self.receive_request).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(worker_id = self.id, "No message received");
                self.transition(LifecycleState::Idle);
                return CycleOutcome::Empty;
            }
            Err(e) => {
                error!(
                    worker_id = self.id,
                    queue = self.queue.name(),
                    queue_url = %self.receive_request.queue_url,
                    error = %e,
                    "Failed to receive message"
                );
                self.transition(LifecycleState::Idle);
                return CycleOutcome::ReceiveFailed;
            }
        };

        debug!(
            worker_id = self.id,
            message_id = %message.log_id(),
            receive_count = ?message.receive_count().ok(),
            "Received message"
        );

        self.transition(LifecycleState::Dispatching);
        let outcome = self.dispatcher.dispatch(&message).await;

        self.transition(LifecycleState::Reconciling);
        self.reconciler.reconcile(&message, &outcome).await;

        self.transition(LifecycleState::Idle);
        CycleOutcome::Completed(outcome)
    }

    fn transition(&mut self, next: LifecycleState) {
        debug!(worker_id = self.id, from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::error::{DispatchError, QueueError};
    use crate::message::Message;
    use crate::queue::MockQueueClient;
    use async_trait::async_trait;

    const QUEUE: &str = "http://localhost:9324/000000000000/jobs";

    struct FixedDispatcher(DispatchOutcome);

    #[async_trait]
    impl JobDispatcher for FixedDispatcher {
        async fn dispatch(&self, _message: &Message) -> DispatchOutcome {
            self.0.clone()
        }
    }

    fn worker(queue: MockQueueClient, outcome: DispatchOutcome) -> Worker {
        let config = Arc::new(WorkerConfig::new(QUEUE, "http://localhost:3000/jobs"));
        let queue: Arc<dyn QueueClient> = Arc::new(queue);
        Worker::new(
            7,
            Arc::clone(&queue),
            Arc::new(FixedDispatcher(outcome)),
            Reconciler::new(queue, Arc::clone(&config)),
            ReceiveRequest::from_config(&config),
        )
    }

    #[tokio::test]
    async fn test_empty_receive_has_no_side_effects() {
        let mut queue = MockQueueClient::new();
        queue.expect_receive().times(1).returning(|_| Ok(None));
        queue.expect_delete().times(0);
        queue.expect_send().times(0);

        let mut worker = worker(queue, DispatchOutcome::Success);
        assert_eq!(worker.run_cycle().await, CycleOutcome::Empty);
        assert_eq!(worker.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_receive_error_ends_cycle() {
        let mut queue = MockQueueClient::new();
        queue
            .expect_receive()
            .times(1)
            .returning(|_| Err(QueueError::receive("connection refused")));
        queue.expect_name().return_const("mock");
        queue.expect_delete().times(0);

        let mut worker = worker(queue, DispatchOutcome::Success);
        assert_eq!(worker.run_cycle().await, CycleOutcome::ReceiveFailed);
        assert_eq!(worker.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_completed_cycle_reconciles() {
        let mut queue = MockQueueClient::new();
        queue
            .expect_receive()
            .withf(|request| request.queue_url == QUEUE && request.attribute_names.len() == 1)
            .times(1)
            .returning(|_| Ok(Some(Message::new("handle-1", "{}").with_receive_count(1))));
        queue
            .expect_delete()
            .withf(|_, handle| handle == "handle-1")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut worker = worker(queue, DispatchOutcome::Success);
        assert_eq!(
            worker.run_cycle().await,
            CycleOutcome::Completed(DispatchOutcome::Success)
        );
    }

    #[tokio::test]
    async fn test_failed_dispatch_still_completes() {
        let mut queue = MockQueueClient::new();
        queue
            .expect_receive()
            .times(1)
            .returning(|_| Ok(Some(Message::new("handle-1", "{}").with_receive_count(1))));
        queue.expect_delete().times(0);

        let failure = DispatchOutcome::Failure(DispatchError::transport("connection refused"));
        let mut worker = worker(queue, failure.clone());
        assert_eq!(worker.run_cycle().await, CycleOutcome::Completed(failure));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Reconciling.to_string(), "reconciling");
    }
}
