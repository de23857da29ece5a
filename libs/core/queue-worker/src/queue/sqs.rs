//! Amazon SQS queue client
//!
//! Works against AWS and against SQS-compatible servers (ElasticMQ) by
//! pointing the SDK at a custom endpoint.
//!
//! Credentials follow the AWS SDK default chain:
//! - Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`)
//! - Web identity token (EKS IRSA)
//! - IAM instance profile (EC2/ECS)
//! - Shared credentials file

use super::{QueueClient, ReceiveRequest};
use crate::error::QueueError;
use crate::message::Message;
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message as SqsMessage, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use std::collections::HashMap;
use tracing::debug;

/// Queue client backed by the AWS SDK
#[derive(Clone, Debug)]
pub struct SqsQueueClient {
    client: Client,
}

impl SqsQueueClient {
    /// Wrap an existing SDK client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS config chain.
    ///
    /// `endpoint_url` overrides the service endpoint, e.g. `http://localhost:9324`
    /// for a local ElasticMQ.
    pub async fn from_env(endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(url) = endpoint_url {
            loader = loader.endpoint_url(url);
        }

        let shared = loader.load().await;
        Self::new(Client::new(&shared))
    }
}

fn whole_seconds(duration: std::time::Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

impl From<SqsMessage> for Message {
    fn from(msg: SqsMessage) -> Self {
        let attributes: HashMap<String, String> = msg
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(key, value)| (key.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            message_id: msg.message_id().map(str::to_string),
            receipt_handle: msg.receipt_handle().unwrap_or_default().to_string(),
            body: msg.body().unwrap_or_default().to_string(),
            attributes,
        }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Option<Message>, QueueError> {
        let attribute_names = request
            .attribute_names
            .iter()
            .map(|name| MessageSystemAttributeName::from(name.as_str()));

        let mut call = self
            .client
            .receive_message()
            .queue_url(&request.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(whole_seconds(request.wait))
            .visibility_timeout(whole_seconds(request.visibility_timeout));

        for name in attribute_names {
            call = call.message_system_attribute_names(name);
        }

        let output = call
            .send()
            .await
            .map_err(|e| QueueError::receive(DisplayErrorContext(e).to_string()))?;

        let message = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(Message::from);

        if message.is_none() {
            debug!(queue_url = %request.queue_url, "Receive returned no messages");
        }

        Ok(message)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::delete(DisplayErrorContext(e).to_string()))?;

        Ok(())
    }

    async fn send(&self, queue_url: &str, body: &str) -> Result<(), QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::send(DisplayErrorContext(e).to_string()))?;

        debug!(
            queue_url = %queue_url,
            message_id = ?output.message_id(),
            "Sent message"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}
