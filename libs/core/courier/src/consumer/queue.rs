//! The queue consumption loop.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::ConsumerConfig;
use crate::error::CourierError;
use crate::metrics::ConsumerMetrics;
use crate::reader::Reader;
use crate::receiver::{Flow, Receiver};

use super::{Consume, StopToken};

/// Blocking consumption loop over a [`Reader`].
///
/// `start` is dispatched once; then, while running, each iteration reads one
/// envelope (dispatching `receive`) or times out (dispatching
/// `receive_timeout`), and processes any pending stop signal afterwards.
/// On stop the reader is stopped, requeueing buffered work and closing the
/// connection, and `terminate` is dispatched.
pub struct QueueConsumer {
    reader: Box<dyn Reader>,
    chain: Box<dyn Receiver>,
    config: ConsumerConfig,
    token: StopToken,
    metrics: ConsumerMetrics,
    running: bool,
}

impl QueueConsumer {
    /// Build a consumer over a reader and a receiver chain.
    pub fn new(
        reader: Box<dyn Reader>,
        chain: Box<dyn Receiver>,
        config: ConsumerConfig,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            chain,
            config,
            token: StopToken::new(),
            metrics: ConsumerMetrics::new(destination),
            running: false,
        }
    }

    async fn run_loop(&mut self) -> Result<(), CourierError> {
        self.running = true;
        while self.running {
            match self.reader.read(self.config.wait).await? {
                Some(mut envelope) => {
                    self.metrics.message_received();
                    match self.chain.receive(&mut envelope).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => self.token.stop(),
                        Err(CourierError::ProcessorNotFound(handler)) => {
                            self.metrics.processor_missing();
                            warn!(handler = %handler, "No processor for message");
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => {
                    self.metrics.read_timeout();
                    match self.chain.receive_timeout().await? {
                        Flow::Continue => {}
                        Flow::Stop => self.token.stop(),
                    }
                }
            }

            self.process_stop_signal().await?;
        }
        Ok(())
    }

    /// Observe a pending stop request, dispatching `receive_stop` exactly
    /// once (guarded by the running flag).
    async fn process_stop_signal(&mut self) -> Result<(), CourierError> {
        if self.token.is_stopped() && self.running {
            self.running = false;
            self.metrics.stopped();
            self.chain.receive_stop().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Consume for QueueConsumer {
    async fn run(&mut self) -> Result<(), CourierError> {
        self.chain.start().await?;
        info!(consumer_id = %self.config.consumer_id, "Starting queue consumer");

        let loop_result = self.run_loop().await;
        let stop_result = self.reader.stop().await;
        self.chain.terminate().await?;

        info!(consumer_id = %self.config.consumer_id, "Queue consumer stopped");
        loop_result.and(stop_result)
    }

    fn stop_token(&self) -> StopToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Envelope;
    use crate::driver::{QueueDriver, Wait};
    use crate::memory::MemoryDriver;
    use crate::message::Message;
    use crate::reader::SingleQueueReader;
    use crate::receiver::testing::CountingReceiver;
    use crate::receiver::{LimitReceiver, StopWhenEmptyReceiver};
    use std::sync::Arc;

    fn config() -> ConsumerConfig {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        ConsumerConfig::new().with_wait(Wait::NoWait)
    }

    async fn push(driver: &MemoryDriver, n: i64) {
        driver
            .push(&Message::new(serde_json::json!({ "n": n })).with_destination("jobs"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_drains_queue_and_runs_full_lifecycle() {
        let driver = MemoryDriver::new();
        push(&driver, 1).await;
        push(&driver, 2).await;

        let (counting, counters) = CountingReceiver::new();
        let chain = StopWhenEmptyReceiver::new(Box::new(counting));
        let reader = SingleQueueReader::new(Arc::new(driver.clone()), "jobs");

        let mut consumer =
            QueueConsumer::new(Box::new(reader), Box::new(chain), config(), "jobs");
        consumer.run().await.unwrap();

        use std::sync::atomic::Ordering;
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.receives.load(Ordering::SeqCst), 2);
        assert_eq!(counters.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 1);
        assert_eq!(driver.count("jobs").await.unwrap(), 0);
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_limit_stops_after_n_messages() {
        let driver = MemoryDriver::new();
        for n in 0..5 {
            push(&driver, n).await;
        }

        let (counting, counters) = CountingReceiver::new();
        let chain = LimitReceiver::new(3, Box::new(counting));
        let reader = SingleQueueReader::new(Arc::new(driver.clone()), "jobs");

        let mut consumer =
            QueueConsumer::new(Box::new(reader), Box::new(chain), config(), "jobs");
        consumer.run().await.unwrap();

        use std::sync::atomic::Ordering;
        assert_eq!(counters.receives.load(Ordering::SeqCst), 3);
        assert_eq!(driver.count("jobs").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_double_stop_dispatches_receive_stop_once() {
        let driver = MemoryDriver::new();
        push(&driver, 1).await;

        let (counting, counters) = CountingReceiver::new();
        let reader = SingleQueueReader::new(Arc::new(driver.clone()), "jobs");
        let mut consumer =
            QueueConsumer::new(Box::new(reader), Box::new(counting), config(), "jobs");

        let token = consumer.stop_token();
        token.stop();
        token.stop();

        consumer.run().await.unwrap();

        use std::sync::atomic::Ordering;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        // The message read before the stop was observed is still handled.
        assert_eq!(counters.receives.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_processor_not_found_does_not_kill_the_loop() {
        struct FlakyResolver {
            calls: u32,
        }

        #[async_trait]
        impl Receiver for FlakyResolver {
            async fn receive(&mut self, envelope: &mut Envelope) -> Result<Flow, CourierError> {
                self.calls += 1;
                if self.calls == 1 {
                    return Err(CourierError::ProcessorNotFound("unknown_job".to_string()));
                }
                envelope.acknowledge().await?;
                Ok(Flow::Stop)
            }
        }

        let driver = MemoryDriver::new();
        push(&driver, 1).await;
        push(&driver, 2).await;

        let reader = SingleQueueReader::new(Arc::new(driver.clone()), "jobs");
        let mut consumer = QueueConsumer::new(
            Box::new(reader),
            Box::new(FlakyResolver { calls: 0 }),
            config(),
            "jobs",
        );

        consumer.run().await.unwrap();
        // First delivery errored with ProcessorNotFound, second stopped the
        // loop: both were dispatched.
        assert_eq!(driver.count("jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_other_chain_errors_propagate() {
        struct BrokenReceiver;

        #[async_trait]
        impl Receiver for BrokenReceiver {
            async fn receive(&mut self, _envelope: &mut Envelope) -> Result<Flow, CourierError> {
                Err(CourierError::server("unhandled"))
            }
        }

        let driver = MemoryDriver::new();
        push(&driver, 1).await;

        let reader = SingleQueueReader::new(Arc::new(driver.clone()), "jobs");
        let mut consumer =
            QueueConsumer::new(Box::new(reader), Box::new(BrokenReceiver), config(), "jobs");

        assert!(consumer.run().await.is_err());
        // The reader was still stopped on the way out.
        assert_eq!(driver.close_count(), 1);
    }
}
