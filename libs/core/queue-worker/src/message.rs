//! Received queue message
//!
//! Read-only data plus the receipt handle that proves this consumer currently
//! holds the delivery.

use crate::error::AttributeError;
use std::collections::HashMap;

/// Queue-maintained delivery counter requested on every receive.
pub const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

/// A message received from the source queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Queue-assigned message ID (diagnostics only)
    pub message_id: Option<String>,

    /// Token required to delete this delivery
    pub receipt_handle: String,

    /// Application payload, forwarded verbatim to the job endpoint
    pub body: String,

    /// System attributes returned with the message
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create a message without attributes
    pub fn new(receipt_handle: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Set the message ID
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Set an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the approximate receive count attribute
    pub fn with_receive_count(self, count: u32) -> Self {
        self.with_attribute(RECEIVE_COUNT_ATTRIBUTE, count.to_string())
    }

    /// How many times the queue has delivered this message.
    pub fn receive_count(&self) -> Result<u32, AttributeError> {
        let raw = self
            .attributes
            .get(RECEIVE_COUNT_ATTRIBUTE)
            .ok_or_else(|| AttributeError::Missing(RECEIVE_COUNT_ATTRIBUTE.to_string()))?;

        raw.trim().parse().map_err(|_| AttributeError::Malformed {
            name: RECEIVE_COUNT_ATTRIBUTE.to_string(),
            value: raw.clone(),
        })
    }

    /// Identifier for log lines: the message ID when known, else the receipt handle.
    pub fn log_id(&self) -> &str {
        self.message_id.as_deref().unwrap_or(&self.receipt_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_count_parses() {
        let message = Message::new("handle-1", "{}").with_attribute(RECEIVE_COUNT_ATTRIBUTE, "3");
        assert_eq!(message.receive_count(), Ok(3));
    }

    #[test]
    fn test_receive_count_missing() {
        let message = Message::new("handle-1", "{}");
        assert!(matches!(message.receive_count(), Err(AttributeError::Missing(_))));
    }

    #[test]
    fn test_receive_count_malformed() {
        for raw in ["", "three", "-1", "2.5"] {
            let message = Message::new("handle-1", "{}").with_attribute(RECEIVE_COUNT_ATTRIBUTE, raw);
            assert!(
                matches!(message.receive_count(), Err(AttributeError::Malformed { .. })),
                "value {raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_log_id_prefers_message_id() {
        let message = Message::new("handle-1", "{}");
        assert_eq!(message.log_id(), "handle-1");
        assert_eq!(message.with_message_id("msg-1").log_id(), "msg-1");
    }
}
