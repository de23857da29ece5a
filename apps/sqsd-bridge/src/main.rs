//! SQS Bridge - Entry Point
//!
//! Forwards SQS messages to an HTTP job endpoint.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    sqsd_bridge::run().await
}
