//! Core broker implementation.
//!
//! A `Broker<T>` maps a topic string to the set of subscriber queues
//! currently attached to it. Queues are bounded `tokio::sync::mpsc`
//! channels; a full queue blocks the publisher rather than dropping
//! messages, so a slow subscriber slows its own topic instead of losing
//! events. Dropping a `Subscription` detaches its queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Default per-subscriber queue capacity.
///
/// A single slot is enough for consumers that drain promptly and gives the
/// publisher immediate back-pressure when they do not.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Topic-keyed publish/subscribe broker.
///
/// Cheap to clone; all clones share the same topic table. The broker never
/// keeps publishers or subscribers alive: a dropped [`Subscription`] stops
/// receiving immediately and its queue is pruned on the next publish to
/// that topic.
///
/// # Example
///
/// ```rust,ignore
/// let broker: Broker<f64> = Broker::new();
/// let mut sub = broker.subscribe("aabbccdd-0000-0000-0000000000000000");
/// broker.publish("aabbccdd-0000-0000-0000000000000000", 1.0).await;
/// assert_eq!(sub.recv().await, Some(1.0));
/// ```
pub struct Broker<T> {
    topics: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<T>>>>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> Broker<T> {
    /// Create a broker with the default queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a broker whose subscriber queues hold up to `capacity`
    /// messages before publishers block.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Attach a new subscriber queue to `topic`.
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription<T> {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel(self.capacity);
        self.topics
            .lock()
            .expect("broker topic table poisoned")
            .entry(topic.clone())
            .or_default()
            .push(tx);
        Subscription { topic, rx }
    }

    /// Deliver `msg` to every queue currently subscribed to `topic`.
    ///
    /// Delivery happens in subscriber-registration order and awaits each
    /// queue in turn, so a full queue blocks the publisher. Queues whose
    /// subscriber has gone away are detached. Publishing to a topic with
    /// no subscribers is a no-op.
    pub async fn publish(&self, topic: &str, msg: T) {
        let senders = {
            let topics = self.topics.lock().expect("broker topic table poisoned");
            match topics.get(topic) {
                Some(senders) => senders.clone(),
                None => return,
            }
        };

        let mut dropped = false;
        for sender in &senders {
            if sender.send(msg.clone()).await.is_err() {
                dropped = true;
            }
        }

        if dropped {
            self.prune(topic);
        }
    }

    /// Number of topics with at least one attached queue.
    pub fn topic_count(&self) -> usize {
        self.topics
            .lock()
            .expect("broker topic table poisoned")
            .len()
    }

    /// Number of live subscriber queues attached to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .expect("broker topic table poisoned")
            .get(topic)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Drop closed queues for `topic`, removing the topic entry once empty.
    fn prune(&self, topic: &str) {
        let mut topics = self.topics.lock().expect("broker topic table poisoned");
        if let Some(senders) = topics.get_mut(topic) {
            senders.retain(|tx| !tx.is_closed());
            if senders.is_empty() {
                topics.remove(topic);
                tracing::debug!(topic, "last subscriber detached");
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            topics: Arc::clone(&self.topics),
            capacity: self.capacity,
        }
    }
}

impl<T> std::fmt::Debug for Broker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A subscriber's end of a topic queue.
///
/// Dropping the subscription detaches the queue; in-flight publishers to
/// the topic observe the closed queue and skip it.
pub struct Subscription<T> {
    topic: String,
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Topic this subscription was created for.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next message for the topic.
    ///
    /// Returns `None` once the subscription has been closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for drain loops and tests.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_to_single_subscriber() {
        let broker: Broker<u32> = Broker::new();
        let mut sub = broker.subscribe("device-1");

        broker.publish("device-1", 42).await;
        assert_eq!(sub.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_publish_order_per_topic() {
        let broker: Broker<u32> = Broker::with_capacity(8);
        let mut sub = broker.subscribe("device-1");

        for n in 0..5 {
            broker.publish("device-1", n).await;
        }
        for n in 0..5 {
            assert_eq!(sub.recv().await, Some(n));
        }
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let broker: Broker<&'static str> = Broker::new();
        let mut a = broker.subscribe("a");
        let mut b = broker.subscribe("b");

        broker.publish("a", "for-a").await;
        assert_eq!(a.recv().await, Some("for-a"));
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let broker: Broker<u32> = Broker::new();
        let mut first = broker.subscribe("t");
        let mut second = broker.subscribe("t");

        broker.publish("t", 7).await;
        assert_eq!(first.recv().await, Some(7));
        assert_eq!(second.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broker: Broker<u32> = Broker::new();
        broker.publish("nobody", 1).await;
        assert_eq!(broker.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscription_detaches() {
        let broker: Broker<u32> = Broker::new();
        let sub = broker.subscribe("t");
        assert_eq!(broker.subscriber_count("t"), 1);

        drop(sub);
        assert_eq!(broker.subscriber_count("t"), 0);

        // Publishing prunes the closed queue and removes the topic.
        broker.publish("t", 1).await;
        assert_eq!(broker.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_applies_back_pressure() {
        let broker: Broker<u32> = Broker::with_capacity(1);
        let mut sub = broker.subscribe("t");

        broker.publish("t", 1).await;

        // Queue is full and the subscriber is not draining, so the next
        // publish must not complete.
        let blocked = {
            let broker = broker.clone();
            tokio::time::timeout(Duration::from_millis(50), async move {
                broker.publish("t", 2).await;
            })
            .await
        };
        assert!(blocked.is_err());

        // Draining unblocks subsequent publishes.
        assert_eq!(sub.recv().await, Some(1));
        broker.publish("t", 3).await;
        assert_eq!(sub.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_one_dead_subscriber_does_not_block_others() {
        let broker: Broker<u32> = Broker::new();
        let dead = broker.subscribe("t");
        let mut live = broker.subscribe("t");

        drop(dead);
        broker.publish("t", 9).await;
        assert_eq!(live.recv().await, Some(9));
        assert_eq!(broker.subscriber_count("t"), 1);
    }
}
