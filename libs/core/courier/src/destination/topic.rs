//! Topic-backed destinations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ConsumerConfig;
use crate::consumer::{Consume, TopicConsumer};
use crate::delivery::QueuedMessage;
use crate::driver::TopicDriver;
use crate::error::CourierError;
use crate::message::Message;
use crate::promise::Promise;
use crate::receiver::Receiver;

use super::{split_names, Destination, RawOptions};

/// A single topic: broadcast sends, subscription consume.
///
/// The driver is forked before each consumer is built, so one destination
/// can spawn several independent consumers without subscription-state
/// collisions.
pub struct TopicDestination {
    driver: Arc<dyn TopicDriver>,
    topic: String,
    config: ConsumerConfig,
}

impl TopicDestination {
    /// Address a topic on a driver.
    pub fn new(driver: Arc<dyn TopicDriver>, topic: impl Into<String>) -> Self {
        Self {
            driver,
            topic: topic.into(),
            config: ConsumerConfig::default(),
        }
    }

    /// Replace the consumer configuration.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// The topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Upgrade to the read-augmented variant. Fails with `Unsupported` when
    /// the driver cannot inspect.
    pub fn try_inspect(self) -> Result<InspectTopicDestination, CourierError> {
        if self.driver.inspect().is_none() {
            return Err(CourierError::unsupported("inspect"));
        }
        Ok(InspectTopicDestination { inner: self })
    }
}

#[async_trait]
impl Destination for TopicDestination {
    async fn send(&self, mut message: Message) -> Result<Promise, CourierError> {
        message.set_destination(self.topic.clone());

        if message.needs_reply() {
            // Replies are a queue protocol; a broadcast has no single
            // reply address.
            warn!(topic = %self.topic, "Reply requested on a topic send, degrading to fire-and-forget");
        }

        self.driver.publish(&message).await?;
        Ok(Promise::null())
    }

    async fn send_raw(&self, payload: &[u8], options: RawOptions) -> Result<(), CourierError> {
        if options.delay.is_some() {
            warn!(topic = %self.topic, "Delay is not supported on topic publishes, ignoring");
        }
        self.driver.publish_raw(&self.topic, payload).await
    }

    fn consumer(&self, chain: Box<dyn Receiver>) -> Result<Box<dyn Consume>, CourierError> {
        Ok(Box::new(TopicConsumer::new(
            self.driver.fork(),
            vec![self.topic.clone()],
            chain,
            self.config.clone(),
            self.topic.clone(),
        )))
    }

    async fn declare(&self) -> Result<(), CourierError> {
        match self.driver.manage() {
            Some(manage) => manage.declare_topic(&self.topic).await,
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), CourierError> {
        match self.driver.manage() {
            Some(manage) => manage.delete_topic(&self.topic).await,
            None => Ok(()),
        }
    }
}

/// Read-augmented single topic: everything [`TopicDestination`] does, plus
/// count/peek through the driver's inspection capability.
pub struct InspectTopicDestination {
    inner: TopicDestination,
}

impl InspectTopicDestination {
    /// Messages currently waiting under the topic.
    pub async fn message_count(&self) -> Result<u64, CourierError> {
        let inspect = self
            .inner
            .driver
            .inspect()
            .ok_or_else(|| CourierError::unsupported("inspect"))?;
        inspect.message_count(&self.inner.topic).await
    }

    /// Page through the topic's backlog without removing anything.
    pub async fn peek(
        &self,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<QueuedMessage>, CourierError> {
        let inspect = self
            .inner
            .driver
            .inspect()
            .ok_or_else(|| CourierError::unsupported("inspect"))?;
        inspect.peek(&self.inner.topic, page_size, page).await
    }
}

#[async_trait]
impl Destination for InspectTopicDestination {
    async fn send(&self, message: Message) -> Result<Promise, CourierError> {
        self.inner.send(message).await
    }

    async fn send_raw(&self, payload: &[u8], options: RawOptions) -> Result<(), CourierError> {
        self.inner.send_raw(payload, options).await
    }

    fn consumer(&self, chain: Box<dyn Receiver>) -> Result<Box<dyn Consume>, CourierError> {
        self.inner.consumer(chain)
    }

    async fn declare(&self) -> Result<(), CourierError> {
        self.inner.declare().await
    }

    async fn destroy(&self) -> Result<(), CourierError> {
        self.inner.destroy().await
    }
}

/// Several topic patterns at once: reads fan in across all of them, writes
/// fan a copy out per topic. No reply support.
pub struct MultiTopicDestination {
    driver: Arc<dyn TopicDriver>,
    topics: Vec<String>,
    config: ConsumerConfig,
}

impl MultiTopicDestination {
    /// Address a set of topic patterns on a driver.
    pub fn new(driver: Arc<dyn TopicDriver>, topics: Vec<String>) -> Self {
        Self {
            driver,
            topics,
            config: ConsumerConfig::default(),
        }
    }

    /// Address a comma-separated topic list.
    pub fn from_list(driver: Arc<dyn TopicDriver>, list: &str) -> Self {
        Self::new(driver, split_names(list))
    }

    /// Replace the consumer configuration.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// The topic patterns.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

#[async_trait]
impl Destination for MultiTopicDestination {
    async fn send(&self, message: Message) -> Result<Promise, CourierError> {
        if message.needs_reply() {
            return Err(CourierError::ReplyNotSupported(self.topics.join(",")));
        }

        for topic in &self.topics {
            let mut copy = message.clone();
            copy.set_destination(topic.clone());
            self.driver.publish(&copy).await?;
        }
        Ok(Promise::null())
    }

    async fn send_raw(&self, payload: &[u8], _options: RawOptions) -> Result<(), CourierError> {
        for topic in &self.topics {
            self.driver.publish_raw(topic, payload).await?;
        }
        Ok(())
    }

    fn consumer(&self, chain: Box<dyn Receiver>) -> Result<Box<dyn Consume>, CourierError> {
        Ok(Box::new(TopicConsumer::new(
            self.driver.fork(),
            self.topics.clone(),
            chain,
            self.config.clone(),
            self.topics.join(","),
        )))
    }

    async fn declare(&self) -> Result<(), CourierError> {
        if let Some(manage) = self.driver.manage() {
            for topic in &self.topics {
                manage.declare_topic(topic).await?;
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), CourierError> {
        if let Some(manage) = self.driver.manage() {
            for topic in &self.topics {
                manage.delete_topic(topic).await?;
            }
        }
        Ok(())
    }
}
