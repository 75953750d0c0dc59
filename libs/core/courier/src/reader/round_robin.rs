//! Fair reading across several queues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::delivery::Envelope;
use crate::driver::{QueueDriver, Wait};
use crate::error::CourierError;

use super::Reader;

/// Per-attempt slice when the caller asked to wait forever: the rotation
/// must keep moving or one busy queue starves the rest.
const ROTATION_SLICE: Duration = Duration::from_secs(1);

/// Reads an ordered list of queues with a rotating cursor.
///
/// Each `read` attempts up to N queues starting from the cursor, advancing
/// the cursor after every attempt whether it hit or not, so consecutive
/// reads keep rotating fairly and low-traffic queues are never starved.
/// A bounded wait is split evenly across one rotation; the call returns the
/// first non-empty pop, or `None` once a full rotation came up empty.
pub struct RoundRobinReader {
    driver: Arc<dyn QueueDriver>,
    queues: Vec<String>,
    cursor: usize,
}

impl RoundRobinReader {
    /// Create a reader rotating over the given queues, in order.
    pub fn new(driver: Arc<dyn QueueDriver>, queues: Vec<String>) -> Self {
        Self {
            driver,
            queues,
            cursor: 0,
        }
    }

    /// Current cursor position. Diagnostic.
    pub fn cursor(&self) -> usize {
        self.cursor
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
impl Reader for RoundRobinReader {
    async fn read(&mut self, wait: Wait) -> Result<Option<Envelope>, CourierError> {
        if self.queues.is_empty() {
            return Ok(None);
        }

        let rotation = self.queues.len();
        let per_attempt = Self::per_attempt(wait, rotation);

        loop {
            for _ in 0..rotation {
                let queue = self.queues[self.cursor].clone();
                self.cursor = (self.cursor + 1) % rotation;

                if let Some(delivery) = self.driver.pop(&queue, per_attempt).await? {
                    return Ok(Some(Envelope::queue(delivery, self.driver.clone())));
                }
            }

            if !matches!(wait, Wait::Forever) {
                return Ok(None);
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CourierError> {
        self.driver.close().await
    }
}
