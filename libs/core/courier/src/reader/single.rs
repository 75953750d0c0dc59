//! One queue, one pop per read.

use std::sync::Arc;

use async_trait::async_trait;

use crate::delivery::Envelope;
use crate::driver::{QueueDriver, Wait};
use crate::error::CourierError;

use super::Reader;

/// Delegates one-to-one to the driver's pop.
pub struct SingleQueueReader {
    driver: Arc<dyn QueueDriver>,
    queue: String,
}

impl SingleQueueReader {
    /// Create a reader over one queue.
    pub fn new(driver: Arc<dyn QueueDriver>, queue: impl Into<String>) -> Self {
        Self {
            driver,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl Reader for SingleQueueReader {
    async fn read(&mut self, wait: Wait) -> Result<Option<Envelope>, CourierError> {
        let delivery = self.driver.pop(&self.queue, wait).await?;
        Ok(delivery.map(|d| Envelope::queue(d, self.driver.clone())))
    }

    async fn stop(&mut self) -> Result<(), CourierError> {
        self.driver.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;
    use crate::message::Message;

    #[tokio::test]
    async fn test_read_and_stop() {
        let driver = MemoryDriver::new();
        driver
            .push(&Message::new(serde_json::json!(1)).with_destination("jobs"))
            .await
            .unwrap();

        let mut reader = SingleQueueReader::new(Arc::new(driver.clone()), "jobs");

        let envelope = reader.read(Wait::NoWait).await.unwrap().unwrap();
        assert_eq!(envelope.message().data(), &serde_json::json!(1));

        assert!(reader.read(Wait::NoWait).await.unwrap().is_none());

        reader.stop().await.unwrap();
        assert_eq!(driver.close_count(), 1);
    }
}
