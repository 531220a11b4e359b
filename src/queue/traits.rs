use crate::queue::QueueResult;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Receipt returned by a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckToken(pub u64);

/// Identifies one delivery of one message on one subscription
///
/// A handle goes stale as soon as the message is delivered again, so a
/// slow consumer cannot acknowledge somebody else's delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedeliveryHandle {
    pub subscription: String,
    pub message_id: u64,
    pub delivery: u32,
}

/// A message handed to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    /// 1 on the first delivery, incremented on every redelivery
    pub attempt: u32,
    pub handle: RedeliveryHandle,
}

impl Delivery {
    /// Decodes the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// At-least-once message queue with fan-out subscriptions
///
/// Every message published to a topic is copied to each subscription bound
/// to it. A delivered message stays invisible until its ack deadline
/// passes; unacknowledged messages are delivered again, and after the
/// configured number of deliveries they are moved to the topic's
/// dead-letter topic. Implementations make no ordering promise.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Binds `subscription` to `topic`, creating both if needed
    async fn create_subscription(&self, topic: &str, subscription: &str) -> QueueResult<()>;

    /// Publishes a message to every subscription of `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> QueueResult<AckToken>;

    /// Waits up to `wait` for a message on `subscription`
    async fn receive(&self, subscription: &str, wait: Duration)
        -> QueueResult<Option<Delivery>>;

    /// Acknowledges a delivery
    ///
    /// # Returns
    ///
    /// `false` if the handle is stale (the message was redelivered,
    /// dead-lettered or already acknowledged).
    async fn ack(&self, handle: &RedeliveryHandle) -> QueueResult<bool>;

    /// Number of messages not yet acknowledged on `subscription`
    async fn depth_estimate(&self, subscription: &str) -> QueueResult<u64>;
}

/// Serializes `value` as JSON and publishes it
pub async fn publish_json<T>(queue: &dyn Queue, topic: &str, value: &T) -> QueueResult<AckToken>
where
    T: Serialize + Sync + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    queue.publish(topic, payload).await
}
