//! Queue reconciliation after a dispatch
//!
//! | Outcome | Dead-letter emulation | Receive count      | Action                      |
//! |---------|-----------------------|--------------------|-----------------------------|
//! | Success | any                   | any                | delete                      |
//! | Failure | off                   | any                | nothing                     |
//! | Failure | on                    | below threshold    | nothing                     |
//! | Failure | on                    | at/above threshold | send body to DLQ, then delete |
//! | Failure | on                    | missing/malformed  | nothing                     |
//!
//! "Nothing" leaves the message to reappear once its visibility timeout
//! expires. Queue errors are logged here and never returned.

use crate::config::WorkerConfig;
use crate::dispatcher::DispatchOutcome;
use crate::error::AttributeError;
use crate::message::Message;
use crate::queue::QueueClient;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a failed message is left on the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainReason {
    /// Dead-letter emulation is off; redrive is the queue's job
    EmulationDisabled,
    /// Still has deliveries left before the threshold
    BelowThreshold { receive_count: u32, max_receive_count: u32 },
    /// Receive count could not be read; treated as below threshold
    UnknownReceiveCount(AttributeError),
}

/// What reconciliation will do with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    Delete,
    Retain { reason: RetainReason },
    DeadLetter { queue_url: String },
}

/// Applies dispatch outcomes to the queue
#[derive(Clone)]
pub struct Reconciler {
    queue: Arc<dyn QueueClient>,
    config: Arc<WorkerConfig>,
}

impl Reconciler {
    pub fn new(queue: Arc<dyn QueueClient>, config: Arc<WorkerConfig>) -> Self {
        Self { queue, config }
    }

    /// Decide the action for `message` without touching the queue.
    pub fn plan(&self, message: &Message, outcome: &DispatchOutcome) -> ReconcileAction {
        if outcome.is_success() {
            return ReconcileAction::Delete;
        }

        let Some(dead_letter_queue) = self.config.dead_letter_target() else {
            return ReconcileAction::Retain {
                reason: RetainReason::EmulationDisabled,
            };
        };

        let max_receive_count = self.config.max_receive_count;
        match message.receive_count() {
            Ok(receive_count) if receive_count >= max_receive_count => ReconcileAction::DeadLetter {
                queue_url: dead_letter_queue.to_string(),
            },
            Ok(receive_count) => ReconcileAction::Retain {
                reason: RetainReason::BelowThreshold {
                    receive_count,
                    max_receive_count,
                },
            },
            Err(e) => ReconcileAction::Retain {
                reason: RetainReason::UnknownReceiveCount(e),
            },
        }
    }

    /// Apply the outcome of a dispatch to the queue.
    pub async fn reconcile(&self, message: &Message, outcome: &DispatchOutcome) {
        match self.plan(message, outcome) {
            ReconcileAction::Delete => self.delete(message).await,
            ReconcileAction::Retain { reason } => match reason {
                RetainReason::UnknownReceiveCount(e) => warn!(
                    message_id = %message.log_id(),
                    error = %e,
                    "Receive count unreadable, leaving message for redelivery"
                ),
                reason => debug!(
                    message_id = %message.log_id(),
                    reason = ?reason,
                    "Leaving failed message for redelivery"
                ),
            },
            ReconcileAction::DeadLetter { queue_url } => {
                self.dead_letter(message, &queue_url).await;
            }
        }
    }

    async fn dead_letter(&self, message: &Message, dead_letter_queue: &str) {
        if let Err(e) = self.queue.send(dead_letter_queue, &message.body).await {
            // The original stays put and is retried on its next delivery.
            error!(
                message_id = %message.log_id(),
                dead_letter_queue = %dead_letter_queue,
                error = %e,
                "Failed to move message to dead-letter queue"
            );
            return;
        }

        info!(
            message_id = %message.log_id(),
            receive_count = ?message.receive_count().ok(),
            dead_letter_queue = %dead_letter_queue,
            "Moved message to dead-letter queue"
        );

        self.delete(message).await;
    }

    async fn delete(&self, message: &Message) {
        match self
            .queue
            .delete(&self.config.queue_url, &message.receipt_handle)
            .await
        {
            Ok(()) => debug!(message_id = %message.log_id(), "Deleted message"),
            Err(e) => error!(
                message_id = %message.log_id(),
                queue = self.queue.name(),
                error = %e,
                "Failed to delete message"
            ),
        }
    }
}
