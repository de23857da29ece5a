//! Error types for the bridge worker
//!
//! None of these ever escape a worker cycle. They exist so each failure path
//! can be logged and counted with enough context:
//! - **QueueError**: receive/delete/send against the queue failed
//! - **DispatchError**: the job endpoint rejected the message or could not be reached
//! - **AttributeError**: the receive-count attribute is missing or malformed

use std::fmt;
use thiserror::Error;

/// Queue operation that failed, used for log fields and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOperation {
    Receive,
    Delete,
    Send,
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueOperation::Receive => "receive",
            QueueOperation::Delete => "delete",
            QueueOperation::Send => "send",
        };
        f.write_str(name)
    }
}

/// A queue service call failed.
///
/// Never fatal: the affected message stays in whatever state the queue
/// holds it in and the next cycle or redelivery retries naturally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("queue {operation} failed: {message}")]
pub struct QueueError {
    pub operation: QueueOperation,
    pub message: String,
}

impl QueueError {
    pub fn new(operation: QueueOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }

    pub fn receive(message: impl Into<String>) -> Self {
        Self::new(QueueOperation::Receive, message)
    }

    pub fn delete(message: impl Into<String>) -> Self {
        Self::new(QueueOperation::Delete, message)
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self::new(QueueOperation::Send, message)
    }
}

/// Why a job invocation did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The endpoint answered with a non-2xx status.
    #[error("host returned error status ({description})")]
    Rejected {
        status: u16,
        /// Status line, e.g. "500 Internal Server Error"
        description: String,
        /// Leading part of the response body, kept for diagnostics
        body_snippet: String,
    },

    /// The request never produced a response (connect error, timeout, ...).
    #[error("job transport failed: {reason}")]
    Transport { reason: String, timed_out: bool },
}

impl DispatchError {
    pub fn rejected(status: u16, description: impl Into<String>, body_snippet: impl Into<String>) -> Self {
        DispatchError::Rejected {
            status,
            description: description.into(),
            body_snippet: body_snippet.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        DispatchError::Transport {
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        DispatchError::Transport {
            reason: reason.into(),
            timed_out: true,
        }
    }

    /// HTTP status code, if the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Rejected { status, .. } => Some(*status),
            DispatchError::Transport { .. } => None,
        }
    }

    /// Tag attached to the `error` counter.
    pub fn metric_tag(&self) -> &str {
        match self {
            DispatchError::Rejected { description, .. } => description,
            DispatchError::Transport { timed_out: true, .. } => "timeout",
            DispatchError::Transport { .. } => "transport_error",
        }
    }
}

/// The receive-count attribute could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("attribute '{0}' is missing")]
    Missing(String),

    #[error("attribute '{name}' has unparsable value '{value}'")]
    Malformed { name: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::send("AWS.SimpleQueueService.NonExistentQueue");
        assert_eq!(err.operation, QueueOperation::Send);
        assert_eq!(
            err.to_string(),
            "queue send failed: AWS.SimpleQueueService.NonExistentQueue"
        );
    }

    #[test]
    fn test_dispatch_error_metric_tags() {
        let rejected = DispatchError::rejected(500, "500 Internal Server Error", "boom");
        assert_eq!(rejected.metric_tag(), "500 Internal Server Error");
        assert_eq!(rejected.status(), Some(500));
        assert!(rejected.to_string().contains("500 Internal Server Error"));

        assert_eq!(DispatchError::timeout("deadline").metric_tag(), "timeout");
        assert_eq!(DispatchError::transport("refused").metric_tag(), "transport_error");
        assert_eq!(DispatchError::transport("refused").status(), None);
    }
}
