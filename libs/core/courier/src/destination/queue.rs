//! Queue-backed destinations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ConsumerConfig;
use crate::consumer::{Consume, QueueConsumer};
use crate::driver::QueueDriver;
use crate::error::CourierError;
use crate::message::Message;
use crate::promise::{prepare_reply_request, Promise};
use crate::reader::{BufferedReader, Reader, RoundRobinReader, SingleQueueReader};
use crate::receiver::Receiver;

use super::{split_names, Destination, RawOptions};

/// A single queue: point-to-point sends, reply support, one consumer per
/// call.
pub struct QueueDestination {
    driver: Arc<dyn QueueDriver>,
    queue: String,
    config: ConsumerConfig,
}

impl QueueDestination {
    /// Address a queue on a driver.
    pub fn new(driver: Arc<dyn QueueDriver>, queue: impl Into<String>) -> Self {
        Self {
            driver,
            queue: queue.into(),
            config: ConsumerConfig::default(),
        }
    }

    /// Replace the consumer configuration.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// The queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Messages currently waiting, when the driver can count.
    pub async fn message_count(&self) -> Result<u64, CourierError> {
        self.driver.count(&self.queue).await
    }
}

#[async_trait]
impl Destination for QueueDestination {
    async fn send(&self, mut message: Message) -> Result<Promise, CourierError> {
        message.set_destination(self.queue.clone());

        if message.needs_reply() {
            let (correlation_id, reply_queue) =
                prepare_reply_request(&mut message, &self.queue);
            self.driver.push(&message).await?;
            debug!(queue = %self.queue, correlation_id = %correlation_id, "Sent reply request");
            return Ok(Promise::reply(
                self.driver.clone(),
                reply_queue,
                correlation_id,
            ));
        }

        self.driver.push(&message).await?;
        Ok(Promise::null())
    }

    async fn send_raw(&self, payload: &[u8], options: RawOptions) -> Result<(), CourierError> {
        self.driver
            .push_raw(&self.queue, payload, options.delay)
            .await
    }

    fn consumer(&self, chain: Box<dyn Receiver>) -> Result<Box<dyn Consume>, CourierError> {
        let reader: Box<dyn Reader> = match self.config.prefetch {
            Some(size) if self.driver.reserve().is_some() => Box::new(BufferedReader::new(
                self.driver.clone(),
                self.queue.clone(),
                size,
            )?),
            _ => Box::new(SingleQueueReader::new(
                self.driver.clone(),
                self.queue.clone(),
            )),
        };

        Ok(Box::new(QueueConsumer::new(
            reader,
            chain,
            self.config.clone(),
            self.queue.clone(),
        )))
    }

    async fn declare(&self) -> Result<(), CourierError> {
        match self.driver.manage() {
            Some(manage) => manage.declare_queue(&self.queue).await,
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), CourierError> {
        match self.driver.manage() {
            Some(manage) => manage.delete_queue(&self.queue).await,
            None => Ok(()),
        }
    }
}

/// Several queues at once: reads fan in round-robin, writes fan a copy out
/// to every queue. No reply support: there is no single reply address.
pub struct MultiQueueDestination {
    driver: Arc<dyn QueueDriver>,
    queues: Vec<String>,
    config: ConsumerConfig,
}

impl MultiQueueDestination {
    /// Address a set of queues on a driver.
    pub fn new(driver: Arc<dyn QueueDriver>, queues: Vec<String>) -> Self {
        Self {
            driver,
            queues,
            config: ConsumerConfig::default(),
        }
    }

    /// Address a comma-separated queue list.
    pub fn from_list(driver: Arc<dyn QueueDriver>, list: &str) -> Self {
        Self::new(driver, split_names(list))
    }

    /// Replace the consumer configuration.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// The queue names, in rotation order.
    pub fn queues(&self) -> &[String] {
        &self.queues
    }
}

#[async_trait]
impl Destination for MultiQueueDestination {
    async fn send(&self, message: Message) -> Result<Promise, CourierError> {
        if message.needs_reply() {
            return Err(CourierError::ReplyNotSupported(self.queues.join(",")));
        }

        for queue in &self.queues {
            let mut copy = message.clone();
            copy.set_destination(queue.clone());
            self.driver.push(&copy).await?;
        }
        Ok(Promise::null())
    }

    async fn send_raw(&self, payload: &[u8], options: RawOptions) -> Result<(), CourierError> {
        for queue in &self.queues {
            self.driver.push_raw(queue, payload, options.delay).await?;
        }
        Ok(())
    }

    fn consumer(&self, chain: Box<dyn Receiver>) -> Result<Box<dyn Consume>, CourierError> {
        let reader = RoundRobinReader::new(self.driver.clone(), self.queues.clone());
        Ok(Box::new(QueueConsumer::new(
            Box::new(reader),
            chain,
            self.config.clone(),
            self.queues.join(","),
        )))
    }

    async fn declare(&self) -> Result<(), CourierError> {
        if let Some(manage) = self.driver.manage() {
            for queue in &self.queues {
                manage.declare_queue(queue).await?;
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), CourierError> {
        if let Some(manage) = self.driver.manage() {
            for queue in &self.queues {
                manage.delete_queue(queue).await?;
            }
        }
        Ok(())
    }
}
