//! The topic consumption loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ConsumerConfig;
use crate::delivery::Envelope;
use crate::driver::{TopicCallback, TopicDriver};
use crate::error::CourierError;
use crate::metrics::ConsumerMetrics;
use crate::receiver::{Flow, Receiver};

use super::{Consume, StopToken};

/// Subscription-driven consumption loop over a [`TopicDriver`].
///
/// Subscribes once (a `subscribed` flag makes re-runs idempotent); the
/// subscription callback dispatches `receive` synchronously from the
/// driver's poll and closes the connection on the spot when a stop has been
/// requested, without waiting for the poll cycle to end. The outer loop
/// dispatches `receive_timeout` only for polls that delivered nothing.
pub struct TopicConsumer {
    driver: Arc<dyn TopicDriver>,
    patterns: Vec<String>,
    chain: Arc<Mutex<Box<dyn Receiver>>>,
    config: ConsumerConfig,
    token: StopToken,
    metrics: ConsumerMetrics,
    subscribed: bool,
    running: bool,
    closed_by_callback: Arc<AtomicBool>,
}

impl TopicConsumer {
    /// Build a consumer over a topic driver and a receiver chain.
    pub fn new(
        driver: Arc<dyn TopicDriver>,
        patterns: Vec<String>,
        chain: Box<dyn Receiver>,
        config: ConsumerConfig,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            patterns,
            chain: Arc::new(Mutex::new(chain)),
            config,
            token: StopToken::new(),
            metrics: ConsumerMetrics::new(destination),
            subscribed: false,
            running: false,
            closed_by_callback: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn subscribe(&mut self) -> Result<(), CourierError> {
        if self.subscribed {
            return Ok(());
        }

        let chain = self.chain.clone();
        let token = self.token.clone();
        let driver = self.driver.clone();
        let metrics = self.metrics.clone();
        let closed = self.closed_by_callback.clone();

        let callback: TopicCallback = Arc::new(move |mut envelope: Envelope| {
            let chain = chain.clone();
            let token = token.clone();
            let driver = driver.clone();
            let metrics = metrics.clone();
            let closed = closed.clone();

            Box::pin(async move {
                metrics.message_received();
                match chain.lock().await.receive(&mut envelope).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Stop) => token.stop(),
                    Err(CourierError::ProcessorNotFound(handler)) => {
                        metrics.processor_missing();
                        warn!(handler = %handler, "No processor for message");
                    }
                    Err(e) => return Err(e),
                }
                if token.is_stopped() && !closed.swap(true, Ordering::SeqCst) {
                    driver.close().await?;
                }
                Ok(())
            })
        });

        self.driver.subscribe(&self.patterns, callback).await?;
        self.subscribed = true;
        Ok(())
    }

    async fn run_loop(&mut self) -> Result<(), CourierError> {
        self.running = true;
        while self.running {
            let delivered = self.driver.consume(self.config.wait).await?;
            if delivered == 0 {
                self.metrics.read_timeout();
                match self.chain.lock().await.receive_timeout().await? {
                    Flow::Continue => {}
                    Flow::Stop => self.token.stop(),
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
            self.chain.lock().await.receive_stop().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Consume for TopicConsumer {
    async fn run(&mut self) -> Result<(), CourierError> {
        self.chain.lock().await.start().await?;
        self.subscribe().await?;
        info!(
            consumer_id = %self.config.consumer_id,
            patterns = ?self.patterns,
            "Starting topic consumer"
        );

        let loop_result = self.run_loop().await;
        if !self.closed_by_callback.load(Ordering::SeqCst) {
            self.driver.close().await?;
        }
        self.chain.lock().await.terminate().await?;

        info!(consumer_id = %self.config.consumer_id, "Topic consumer stopped");
        loop_result
    }

    fn stop_token(&self) -> StopToken {
        self.token.clone()
    }
}
