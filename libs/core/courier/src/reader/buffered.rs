//! Prefetching reader over a bulk-reserving driver.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::delivery::{Envelope, QueuedMessage};
use crate::driver::{QueueDriver, Wait};
use crate::error::CourierError;

use super::Reader;

/// Reserves messages in batches and serves them from a local buffer.
///
/// `read` drains the buffer first and only goes back to the driver when it
/// is empty. `stop` releases every still-buffered reservation before closing
/// the connection, so a worker shutting down mid-buffer drops nothing.
pub struct BufferedReader {
    driver: Arc<dyn QueueDriver>,
    queue: String,
    size: usize,
    buffer: VecDeque<QueuedMessage>,
}

impl std::fmt::Debug for BufferedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedReader")
            .field("queue", &self.queue)
            .field("size", &self.size)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl BufferedReader {
    /// Create a prefetching reader. Fails with `Unsupported` when the driver
    /// cannot bulk-reserve.
    pub fn new(
        driver: Arc<dyn QueueDriver>,
        queue: impl Into<String>,
        size: usize,
    ) -> Result<Self, CourierError> {
        if driver.reserve().is_none() {
            return Err(CourierError::unsupported("reserve"));
        }
        Ok(Self {
            driver,
            queue: queue.into(),
            size: size.max(1),
            buffer: VecDeque::new(),
        })
    }

    /// How many reservations are currently buffered. Diagnostic.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[async_trait]
impl Reader for BufferedReader {
    async fn read(&mut self, wait: Wait) -> Result<Option<Envelope>, CourierError> {
        if let Some(delivery) = self.buffer.pop_front() {
            return Ok(Some(Envelope::queue(delivery, self.driver.clone())));
        }

        let reserve = self
            .driver
            .reserve()
            .ok_or_else(|| CourierError::unsupported("reserve"))?;
        let batch = reserve.reserve_batch(&self.queue, self.size, wait).await?;
        if batch.is_empty() {
            return Ok(None);
        }

        debug!(queue = %self.queue, count = batch.len(), "Reserved batch");
        self.buffer.extend(batch);
        let delivery = self.buffer.pop_front().expect("batch is non-empty");
        Ok(Some(Envelope::queue(delivery, self.driver.clone())))
    }

    async fn stop(&mut self) -> Result<(), CourierError> {
        let undelivered = self.buffer.len();
        while let Some(delivery) = self.buffer.pop_front() {
            self.driver.release(&delivery).await?;
        }
        if undelivered > 0 {
            debug!(queue = %self.queue, count = undelivered, "Requeued buffered reservations");
        }
        self.driver.close().await
    }
}
