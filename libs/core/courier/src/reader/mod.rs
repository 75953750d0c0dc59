//! Read strategies: how a consumer pulls the next envelope off a driver.

mod buffered;
mod round_robin;
mod single;

pub use buffered::BufferedReader;
pub use round_robin::RoundRobinReader;
pub use single::SingleQueueReader;

use async_trait::async_trait;

use crate::delivery::Envelope;
use crate::driver::Wait;
use crate::error::CourierError;

/// Pulls envelopes for a consumer.
///
/// `stop` releases any work the reader still holds and closes the
/// underlying connection; the reader is unusable afterwards.
#[async_trait]
pub trait Reader: Send {
    /// Read the next envelope, blocking per `wait`.
    async fn read(&mut self, wait: Wait) -> Result<Option<Envelope>, CourierError>;

    /// Release unread work and close the connection.
    async fn stop(&mut self) -> Result<(), CourierError>;
}
