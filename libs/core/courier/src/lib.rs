//! Backend-agnostic messaging runtime.
//!
//! Applications send and consume messages through a uniform API while the
//! transport underneath (broker, key-value store, table, or in-process
//! memory) is swapped via a driver plugged in at configuration time. The
//! crate is the consumption, routing and reliability core above all
//! drivers; concrete broker adapters are external collaborators
//! implementing the [`QueueDriver`]/[`TopicDriver`] contracts.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   send    ┌──────────────┐   push/publish   ┌──────────┐
//! │  Producer  │──────────▶│ Destination  │─────────────────▶│  Driver  │
//! └────────────┘  Promise  └──────────────┘                  └──────────┘
//!                                │ consumer()                     ▲
//!                                ▼                                │ pop /
//! ┌────────────┐  hooks   ┌──────────────┐      read        ┌──────────┐
//! │  Receiver  │◀─────────│   Consumer   │◀─────────────────│  Reader  │
//! │   chain    │          └──────────────┘    Envelope      └──────────┘
//! └────────────┘
//! ```
//!
//! - [`Message`]/[`Envelope`]: the data carried through the system and its
//!   acknowledge/reject lifecycle.
//! - [`Reader`] strategies: single queue, fair round-robin over many, or a
//!   prefetch buffer over a bulk-reserving driver.
//! - [`Receiver`]: the five-hook middleware chain a consumer drives;
//!   binding, limiting, drain-and-stop, logging and retry ship as stackable
//!   decorators.
//! - [`QueueConsumer`]/[`TopicConsumer`]: the blocking run loops.
//! - [`EmulatedTopics`]: publish/subscribe over plain queues by naming
//!   convention, with cached wildcard matching.
//! - [`Promise`]: request/reply correlation over a reply queue.
//! - [`Destination`]: one send/consume/declare/destroy facade over queues,
//!   topics, and comma-separated sets of either.
//!
//! # Example
//!
//! ```rust
//! use courier::{
//!     Consume, CourierError, Destination, Envelope, Flow, FnReceiver, MemoryDriver,
//!     Message, QueueDestination,
//! };
//! use futures::future::BoxFuture;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CourierError> {
//! let driver = Arc::new(MemoryDriver::new());
//! let jobs = QueueDestination::new(driver, "jobs");
//!
//! jobs.send(Message::new(serde_json::json!({"hello": "world"}))).await?;
//!
//! let handler = FnReceiver::new(|envelope: &mut Envelope| {
//!     Box::pin(async move {
//!         envelope.acknowledge().await?;
//!         Ok(Flow::Stop)
//!     }) as BoxFuture<'_, Result<Flow, CourierError>>
//! });
//! let mut consumer = jobs.consumer(Box::new(handler))?;
//! consumer.run().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod consumer;
mod delivery;
mod destination;
mod driver;
mod error;
mod memory;
mod message;
pub mod metrics;
mod promise;
mod reader;
mod receiver;
mod serializer;
mod topic;

pub use config::{BackoffStrategy, ConsumerConfig, RetryPolicy, TopicRouting};
pub use consumer::{Consume, QueueConsumer, StopToken, TopicConsumer};
pub use delivery::{DeliveryHandle, Envelope, EnvelopeKind, QueuedMessage};
pub use destination::{
    Destination, InspectTopicDestination, MultiQueueDestination, MultiTopicDestination,
    QueueDestination, RawOptions, TopicDestination,
};
pub use driver::{
    DriverStats, InspectQueues, InspectTopics, ManageQueues, ManageTopics, QueueDriver,
    QueueStats, ReserveQueues, TopicCallback, TopicDriver, Wait,
};
pub use error::CourierError;
pub use memory::MemoryDriver;
pub use message::{
    Message, HEADER_CORRELATION_ID, HEADER_PARTITION_KEY, HEADER_PRIORITY, HEADER_REPLY_TO,
    HEADER_TTR,
};
pub use metrics::{init_metrics, ConsumerMetrics};
pub use promise::{Promise, ReplyPromise, REPLY_QUEUE_SUFFIX};
pub use reader::{BufferedReader, Reader, RoundRobinReader, SingleQueueReader};
pub use receiver::{
    BindReceiver, Flow, FnReceiver, LimitReceiver, LogReceiver, MessageBinder, NullReceiver,
    Receiver, RetryReceiver, StopWhenEmptyReceiver,
};
pub use serializer::{JsonSerializer, Serializer};
pub use topic::{EmulatedTopics, MatchCache};
