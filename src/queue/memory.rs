use crate::queue::{
    dead_letter_topic, AckToken, Delivery, Queue, QueueError, QueueResult, RedeliveryHandle,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A message as stored on one subscription
#[derive(Debug)]
struct StoredMessage {
    payload: Arc<Vec<u8>>,
    /// Deliveries so far
    deliveries: u32,
    /// Set while a delivery is outstanding
    lease_until: Option<Instant>,
}

#[derive(Debug)]
struct Subscription {
    topic: String,
    /// Keyed by message id; iteration order approximates publish order
    messages: BTreeMap<u64, StoredMessage>,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    /// topic -> bound subscriptions
    topics: HashMap<String, Vec<String>>,
    subscriptions: HashMap<String, Subscription>,
}

impl QueueState {
    fn next_message_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Copies a payload into every subscription of `topic`
    ///
    /// Returns false if the topic does not exist.
    fn fan_out(&mut self, topic: &str, payload: Arc<Vec<u8>>) -> bool {
        let Some(bound) = self.topics.get(topic).cloned() else {
            return false;
        };
        for name in bound {
            let id = self.next_message_id();
            if let Some(sub) = self.subscriptions.get_mut(&name) {
                sub.messages.insert(
                    id,
                    StoredMessage {
                        payload: Arc::clone(&payload),
                        deliveries: 0,
                        lease_until: None,
                    },
                );
            }
        }
        true
    }

    /// Moves every message whose last allowed delivery expired to the
    /// dead-letter topic of its subscription's topic; returns how many moved
    fn sweep_expired(&mut self, now: Instant, max_deliveries: u32) -> usize {
        let mut exhausted: Vec<(String, Arc<Vec<u8>>)> = Vec::new();

        for (name, sub) in self.subscriptions.iter_mut() {
            let expired: Vec<u64> = sub
                .messages
                .iter()
                .filter(|(_, msg)| {
                    msg.deliveries >= max_deliveries
                        && msg.lease_until.is_some_and(|until| until <= now)
                })
                .map(|(id, _)| *id)
                .collect();

            for id in expired {
                if let Some(msg) = sub.messages.remove(&id) {
                    warn!(
                        subscription = %name,
                        message_id = id,
                        deliveries = msg.deliveries,
                        "Delivery attempts exhausted, moving message to dead letter"
                    );
                    exhausted.push((dead_letter_topic(&sub.topic), msg.payload));
                }
            }
        }

        let moved = exhausted.len();
        for (topic, payload) in exhausted {
            if !self.fan_out(&topic, payload) {
                warn!(topic = %topic, "Dead-letter topic has no subscriptions, message dropped");
            }
        }
        moved
    }

    /// Earliest instant at which a leased message of `subscription` becomes
    /// visible again
    fn next_expiry(&self, subscription: &str) -> Option<Instant> {
        self.subscriptions
            .get(subscription)?
            .messages
            .values()
            .filter_map(|msg| msg.lease_until)
            .min()
    }
}

/// In-process implementation of [`Queue`]
///
/// Messages live in memory only. Delivery semantics match a managed
/// pub/sub service: fan-out per subscription, an ack deadline after which
/// an unacknowledged message is delivered again, and a dead-letter topic
/// (`<topic>.dead-letter`) after `max_delivery_attempts` deliveries.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    ack_deadline: Duration,
    max_delivery_attempts: u32,
}

impl MemoryQueue {
    /// Creates an empty queue
    ///
    /// # Arguments
    ///
    /// * `ack_deadline` - How long a delivery stays invisible to other consumers
    /// * `max_delivery_attempts` - Deliveries before dead-lettering (at least 1)
    pub fn new(ack_deadline: Duration, max_delivery_attempts: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            ack_deadline,
            max_delivery_attempts: max_delivery_attempts.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every mutation leaves the maps consistent; poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes the first visible message of `subscription`, leasing it
    fn try_take(&self, subscription: &str) -> QueueResult<Option<Delivery>> {
        let now = Instant::now();
        let mut state = self.lock();
        if state.sweep_expired(now, self.max_delivery_attempts) > 0 {
            self.notify.notify_waiters();
        }

        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| QueueError::UnknownSubscription(subscription.to_string()))?;

        let visible = sub
            .messages
            .iter_mut()
            .find(|(_, msg)| msg.lease_until.map_or(true, |until| until <= now));

        let Some((id, msg)) = visible else {
            return Ok(None);
        };

        msg.deliveries += 1;
        msg.lease_until = Some(now + self.ack_deadline);

        if msg.deliveries > 1 {
            debug!(
                subscription = subscription,
                message_id = *id,
                attempt = msg.deliveries,
                "Redelivering message"
            );
        }

        Ok(Some(Delivery {
            payload: msg.payload.as_ref().clone(),
            attempt: msg.deliveries,
            handle: RedeliveryHandle {
                subscription: subscription.to_string(),
                message_id: *id,
                delivery: msg.deliveries,
            },
        }))
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn create_subscription(&self, topic: &str, subscription: &str) -> QueueResult<()> {
        let mut state = self.lock();

        if let Some(existing) = state.subscriptions.get(subscription) {
            if existing.topic != topic {
                return Err(QueueError::SubscriptionConflict {
                    subscription: subscription.to_string(),
                    topic: existing.topic.clone(),
                });
            }
            return Ok(());
        }

        state.subscriptions.insert(
            subscription.to_string(),
            Subscription {
                topic: topic.to_string(),
                messages: BTreeMap::new(),
            },
        );
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(subscription.to_string());

        debug!(topic = topic, subscription = subscription, "Subscription created");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> QueueResult<AckToken> {
        let token = {
            let mut state = self.lock();
            let token = AckToken(state.next_id + 1);
            if !state.fan_out(topic, Arc::new(payload)) {
                return Err(QueueError::UnknownTopic(topic.to_string()));
            }
            token
        };
        self.notify.notify_waiters();
        Ok(token)
    }

    async fn receive(
        &self,
        subscription: &str,
        wait: Duration,
    ) -> QueueResult<Option<Delivery>> {
        let give_up = Instant::now() + wait;

        loop {
            // Register interest before looking so a publish between the
            // check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take(subscription)? {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= give_up {
                return Ok(None);
            }

            let next_expiry = self.lock().next_expiry(subscription);
            let wake_at = match next_expiry {
                Some(expiry) if expiry > now => expiry.min(give_up),
                Some(_) => now + Duration::from_millis(1),
                None => give_up,
            };

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, handle: &RedeliveryHandle) -> QueueResult<bool> {
        let mut state = self.lock();
        let sub = state
            .subscriptions
            .get_mut(&handle.subscription)
            .ok_or_else(|| QueueError::UnknownSubscription(handle.subscription.clone()))?;

        match sub.messages.get(&handle.message_id) {
            Some(msg) if msg.deliveries == handle.delivery => {
                sub.messages.remove(&handle.message_id);
                Ok(true)
            }
            _ => {
                debug!(
                    subscription = %handle.subscription,
                    message_id = handle.message_id,
                    "Ignoring stale ack"
                );
                Ok(false)
            }
        }
    }

    async fn depth_estimate(&self, subscription: &str) -> QueueResult<u64> {
        let state = self.lock();
        let sub = state
            .subscriptions
            .get(subscription)
            .ok_or_else(|| QueueError::UnknownSubscription(subscription.to_string()))?;
        Ok(sub.messages.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::publish_json;

    const SHORT: Duration = Duration::from_millis(50);

    async fn queue_with(topic: &str, subs: &[&str], max_attempts: u32) -> MemoryQueue {
        let queue = MemoryQueue::new(SHORT, max_attempts);
        for sub in subs {
            queue.create_subscription(topic, sub).await.unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let queue = queue_with("t", &["s"], 3).await;
        queue.publish("t", b"hello".to_vec()).await.unwrap();

        let delivery = queue.receive("s", SHORT).await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"hello");
        assert_eq!(delivery.attempt, 1);
        assert!(queue.ack(&delivery.handle).await.unwrap());
        assert_eq!(queue.depth_estimate("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscription() {
        let queue = queue_with("t", &["a", "b"], 3).await;
        queue.publish("t", b"x".to_vec()).await.unwrap();

        assert!(queue.receive("a", SHORT).await.unwrap().is_some());
        assert!(queue.receive("b", SHORT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_leased_message_is_invisible() {
        let queue = MemoryQueue::new(Duration::from_secs(30), 3);
        queue.create_subscription("t", "s").await.unwrap();
        queue.publish("t", b"x".to_vec()).await.unwrap();

        assert!(queue.receive("s", SHORT).await.unwrap().is_some());
        assert!(queue.receive("s", SHORT).await.unwrap().is_none());
        assert_eq!(queue.depth_estimate("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_deadline_and_stale_ack() {
        let queue = queue_with("t", &["s"], 3).await;
        queue.publish("t", b"x".to_vec()).await.unwrap();

        let first = queue.receive("s", SHORT).await.unwrap().unwrap();
        let second = queue
            .receive("s", Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.attempt, 2);
        assert!(!queue.ack(&first.handle).await.unwrap());
        assert!(queue.ack(&second.handle).await.unwrap());
        assert!(!queue.ack(&second.handle).await.unwrap());
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_attempts() {
        let queue = queue_with("t", &["s"], 2).await;
        queue
            .create_subscription(&dead_letter_topic("t"), "dl")
            .await
            .unwrap();
        queue.publish("t", b"poison".to_vec()).await.unwrap();

        for expected in 1..=2 {
            let delivery = queue
                .receive("s", Duration::from_millis(500))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.attempt, expected);
        }

        tokio::time::sleep(SHORT * 2).await;
        assert!(queue.receive("s", SHORT).await.unwrap().is_none());

        let dead = queue.receive("dl", SHORT).await.unwrap().unwrap();
        assert_eq!(dead.payload, b"poison");
        assert_eq!(dead.attempt, 1);
    }

    #[tokio::test]
    async fn test_receive_wakes_on_publish() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30), 3));
        queue.create_subscription("t", "s").await.unwrap();

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.receive("s", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        publish_json(queue.as_ref(), "t", &serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let delivery = consumer.await.unwrap().unwrap().unwrap();
        let value: serde_json::Value = delivery.decode().unwrap();
        assert_eq!(value["n"], 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_and_subscription() {
        let queue = MemoryQueue::new(SHORT, 3);
        assert!(matches!(
            queue.publish("missing", vec![]).await,
            Err(QueueError::UnknownTopic(_))
        ));
        assert!(matches!(
            queue.receive("missing", SHORT).await,
            Err(QueueError::UnknownSubscription(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_bound_to_one_topic() {
        let queue = queue_with("t", &["s"], 3).await;
        assert!(queue.create_subscription("t", "s").await.is_ok());
        assert!(matches!(
            queue.create_subscription("other", "s").await,
            Err(QueueError::SubscriptionConflict { .. })
        ));
    }
}
