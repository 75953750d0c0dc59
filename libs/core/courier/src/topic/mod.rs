//! Publish/subscribe emulated over plain queues.
//!
//! Transports without native topics get them by naming convention:
//! subscribing to pattern `T` under consumer group `G` reads the queue
//! `G<sep>T'` (pattern wildcards rewritten to the transport's token), and
//! publishing fans a message out to every queue whose name, minus its group
//! prefix, matches the topic.

mod matcher;

pub use matcher::MatchCache;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::TopicRouting;
use crate::delivery::{Envelope, QueuedMessage};
use crate::driver::{
    InspectTopics, ManageTopics, QueueDriver, TopicCallback, TopicDriver, Wait,
};
use crate::error::CourierError;
use crate::message::Message;
use crate::serializer::{JsonSerializer, Serializer};

/// Canonical wildcard in subscription patterns; rewritten to the
/// transport's own token when forming queue names.
const PATTERN_WILDCARD: char = '*';

/// Per-attempt slice when consuming with an unbounded wait.
const ROTATION_SLICE: Duration = Duration::from_secs(1);

struct Subscription {
    /// Original, pre-translation pattern: each subscription sees only its
    /// own queue's deliveries.
    pattern: String,
    queue: String,
    callback: TopicCallback,
}

/// Topic driver emulated over any queue driver with the management
/// capability.
pub struct EmulatedTopics {
    driver: Arc<dyn QueueDriver>,
    group: String,
    routing: TopicRouting,
    serializer: Arc<dyn Serializer>,
    cache: MatchCache,
    subscriptions: Mutex<Vec<Subscription>>,
    cursor: AtomicUsize,
}

impl EmulatedTopics {
    /// Emulate topics for a consumer group over a queue driver. Fails with
    /// `Unsupported` when the driver cannot enumerate and declare queues.
    pub fn new(
        driver: Arc<dyn QueueDriver>,
        group: impl Into<String>,
        routing: TopicRouting,
    ) -> Result<Self, CourierError> {
        if driver.manage().is_none() {
            return Err(CourierError::unsupported("queue management"));
        }
        Ok(Self {
            driver,
            group: group.into(),
            cache: MatchCache::new(routing.clone()),
            routing,
            serializer: Arc::new(JsonSerializer),
            subscriptions: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Replace the payload codec.
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// The memoizing matcher. Diagnostic.
    pub fn match_cache(&self) -> &MatchCache {
        &self.cache
    }

    /// How many subscriptions are registered on this connection. Diagnostic.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .expect("subscription registry poisoned")
            .len()
    }

    /// Queue name backing a pattern for this group: wildcards rewritten to
    /// the transport token, group prefix attached.
    fn queue_for(&self, pattern: &str) -> String {
        let translated =
            pattern.replace(PATTERN_WILDCARD, &self.routing.wildcard);
        format!("{}{}{}", self.group, self.routing.separator, translated)
    }

    /// Every known queue whose remainder (name minus group prefix) matches
    /// the topic. Queues without the separator are not topic queues.
    async fn matching_queues(&self, topic: &str) -> Result<Vec<String>, CourierError> {
        let manage = self
            .driver
            .manage()
            .ok_or_else(|| CourierError::unsupported("queue management"))?;
        let names = manage.queue_names().await?;
        Ok(names
            .into_iter()
            .filter(|name| {
                name.split_once(&self.routing.separator)
                    .is_some_and(|(_, remainder)| self.cache.matches(remainder, topic))
            })
            .collect())
    }

    fn per_attempt(wait: Wait, attempts: usize) -> Wait {
        match wait {
            Wait::NoWait => Wait::NoWait,
            Wait::For(d) => Wait::For(d / attempts as u32),
            Wait::Forever => Wait::For(ROTATION_SLICE),
        }
    }
}

#[async_trait]
impl TopicDriver for EmulatedTopics {
    async fn publish(&self, message: &Message) -> Result<(), CourierError> {
        let topic = message
            .destination()
            .ok_or_else(|| CourierError::server("message has no destination"))?;
        let payload = self.serializer.serialize(message)?;

        let queues = self.matching_queues(topic).await?;
        debug!(topic = %topic, queues = queues.len(), "Publishing");
        for queue in queues {
            self.driver
                .push_raw(&queue, &payload, message.delay())
                .await?;
        }
        Ok(())
    }

    async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<(), CourierError> {
        for queue in self.matching_queues(topic).await? {
            self.driver.push_raw(&queue, payload, None).await?;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        patterns: &[String],
        callback: TopicCallback,
    ) -> Result<(), CourierError> {
        let manage = self
            .driver
            .manage()
            .ok_or_else(|| CourierError::unsupported("queue management"))?;

        for pattern in patterns {
            let queue = self.queue_for(pattern);
            manage.declare_queue(&queue).await?;
            debug!(pattern = %pattern, queue = %queue, "Subscribed");
            self.subscriptions
                .lock()
                .expect("subscription registry poisoned")
                .push(Subscription {
                    pattern: pattern.clone(),
                    queue,
                    callback: callback.clone(),
                });
        }
        Ok(())
    }

    async fn consume(&self, wait: Wait) -> Result<usize, CourierError> {
        let subscriptions: Vec<(String, String, TopicCallback)> = {
            let registry = self
                .subscriptions
                .lock()
                .expect("subscription registry poisoned");
            registry
                .iter()
                .map(|s| (s.pattern.clone(), s.queue.clone(), s.callback.clone()))
                .collect()
        };
        if subscriptions.is_empty() {
            return Err(CourierError::server("consume called with no subscriptions"));
        }

        let rotation = subscriptions.len();
        let per_attempt = Self::per_attempt(wait, rotation);
        let mut delivered = 0;

        loop {
            for _ in 0..rotation {
                let index = self.cursor.fetch_add(1, Ordering::SeqCst) % rotation;
                let (pattern, queue, callback) = &subscriptions[index];

                if let Some(delivery) = self.driver.pop(queue, per_attempt).await? {
                    debug!(pattern = %pattern, queue = %queue, "Delivering to subscription");
                    let envelope = Envelope::topic(delivery, Some(self.driver.clone()));
                    callback.as_ref()(envelope).await?;
                    delivered += 1;
                }
            }

            if delivered > 0 || !matches!(wait, Wait::Forever) {
                return Ok(delivered);
            }
        }
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.driver.close().await
    }

    fn fork(&self) -> Arc<dyn TopicDriver> {
        Arc::new(Self {
            driver: self.driver.clone(),
            group: self.group.clone(),
            routing: self.routing.clone(),
            serializer: self.serializer.clone(),
            cache: MatchCache::new(self.routing.clone()),
            subscriptions: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        })
    }

    fn manage(&self) -> Option<&dyn ManageTopics> {
        Some(self)
    }

    fn inspect(&self) -> Option<&dyn InspectTopics> {
        self.driver.inspect().map(|_| self as &dyn InspectTopics)
    }
}

#[async_trait]
impl ManageTopics for EmulatedTopics {
    async fn declare_topic(&self, topic: &str) -> Result<(), CourierError> {
        let manage = self
            .driver
            .manage()
            .ok_or_else(|| CourierError::unsupported("queue management"))?;
        manage.declare_queue(&self.queue_for(topic)).await
    }

    async fn delete_topic(&self, topic: &str) -> Result<(), CourierError> {
        let manage = self
            .driver
            .manage()
            .ok_or_else(|| CourierError::unsupported("queue management"))?;
        manage.delete_queue(&self.queue_for(topic)).await
    }
}

#[async_trait]
impl InspectTopics for EmulatedTopics {
    async fn message_count(&self, topic: &str) -> Result<u64, CourierError> {
        self.driver.count(&self.queue_for(topic)).await
    }

    async fn peek(
        &self,
        topic: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<QueuedMessage>, CourierError> {
        let inspect = self
            .driver
            .inspect()
            .ok_or_else(|| CourierError::unsupported("peek"))?;
        inspect.peek(&self.queue_for(topic), page_size, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;
    use futures::future::BoxFuture;
    use std::sync::Mutex as StdMutex;

    fn emulated(driver: &MemoryDriver, group: &str) -> EmulatedTopics {
        EmulatedTopics::new(Arc::new(driver.clone()), group, TopicRouting::default()).unwrap()
    }

    fn collector() -> (TopicCallback, Arc<StdMutex<Vec<String>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: TopicCallback = Arc::new(move |mut envelope: Envelope| {
            let sink = sink.clone();
            Box::pin(async move {
                let topic = envelope
                    .message()
                    .destination()
                    .unwrap_or_default()
                    .to_string();
                sink.lock().unwrap().push(topic);
                envelope.acknowledge().await?;
                Ok(())
            }) as BoxFuture<'static, Result<(), CourierError>>
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn test_publish_delivers_per_wildcard_convention() {
        let driver = MemoryDriver::new();
        let manage = driver.manage().unwrap();
        manage.declare_queue("g/foo.bar").await.unwrap();
        manage.declare_queue("g/other").await.unwrap();
        manage.declare_queue("g2/foo.*").await.unwrap();

        let topics = emulated(&driver, "g");
        let message = Message::new(serde_json::json!({"hello": 1})).with_destination("foo.bar");
        topics.publish(&message).await.unwrap();

        assert_eq!(driver.count("g/foo.bar").await.unwrap(), 1);
        assert_eq!(driver.count("g2/foo.*").await.unwrap(), 1);
        assert_eq!(driver.count("g/other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queues_without_separator_are_ignored() {
        let driver = MemoryDriver::new();
        driver.manage().unwrap().declare_queue("plainqueue").await.unwrap();

        let topics = emulated(&driver, "g");
        topics
            .publish_raw("plainqueue", b"{}")
            .await
            .unwrap();

        assert_eq!(driver.count("plainqueue").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_declares_translated_queue() {
        let driver = MemoryDriver::new();
        let topics = emulated(&driver, "billing");
        let (callback, _) = collector();

        topics
            .subscribe(&["invoice.*".to_string()], callback)
            .await
            .unwrap();

        let names = driver.manage().unwrap().queue_names().await.unwrap();
        assert_eq!(names, vec!["billing/invoice.*".to_string()]);
    }

    #[tokio::test]
    async fn test_consume_dispatches_to_owning_subscription_only() {
        let driver = MemoryDriver::new();
        let topics = emulated(&driver, "g");

        let (foo_callback, foo_seen) = collector();
        let (bar_callback, bar_seen) = collector();
        topics
            .subscribe(&["foo.*".to_string()], foo_callback)
            .await
            .unwrap();
        topics
            .subscribe(&["bar.*".to_string()], bar_callback)
            .await
            .unwrap();

        let message = Message::new(serde_json::json!(1)).with_destination("foo.ping");
        topics.publish(&message).await.unwrap();

        let delivered = topics.consume(Wait::NoWait).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(foo_seen.lock().unwrap().as_slice(), ["foo.ping"]);
        assert!(bar_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consume_without_subscriptions_is_an_error() {
        let driver = MemoryDriver::new();
        let topics = emulated(&driver, "g");
        assert!(topics.consume(Wait::NoWait).await.is_err());
    }

    #[tokio::test]
    async fn test_fork_shares_broker_but_not_subscriptions() {
        let driver = MemoryDriver::new();
        let topics = emulated(&driver, "g");
        let (callback, _) = collector();
        topics
            .subscribe(&["a".to_string()], callback)
            .await
            .unwrap();

        let fork = topics.fork();
        // The fork sees no subscriptions of its own.
        assert!(fork.consume(Wait::NoWait).await.is_err());

        // But publishing through the fork reaches the original's queue.
        let message = Message::new(serde_json::json!(1)).with_destination("a");
        fork.publish(&message).await.unwrap();
        assert_eq!(driver.count("g/a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inspect_probes_through_to_queue_driver() {
        let driver = MemoryDriver::new();
        let topics = emulated(&driver, "g");
        topics.manage().unwrap().declare_topic("a").await.unwrap();

        let message = Message::new(serde_json::json!(1)).with_destination("a");
        topics.publish(&message).await.unwrap();

        let inspect = TopicDriver::inspect(&topics).expect("memory driver inspects");
        assert_eq!(inspect.message_count("a").await.unwrap(), 1);
        let page = inspect.peek("a", 10, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].message().destination(), Some("a"));
    }
}
