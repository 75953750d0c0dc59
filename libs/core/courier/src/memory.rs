//! In-process memory transport.
//!
//! One logical broker shared by every clone of the driver: cloning models
//! opening another connection to the same transport. Blocking pops park on a
//! [`Notify`] and wake on push, delayed-visibility expiry, or deadline.
//!
//! Implements the full queue contract plus all three optional capabilities
//! (reserve, inspect, manage), so every reader strategy and the emulated
//! topic layer can run against it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::delivery::{DeliveryHandle, QueuedMessage};
use crate::driver::{
    DriverStats, InspectQueues, ManageQueues, QueueDriver, QueueStats, ReserveQueues, Wait,
};
use crate::error::CourierError;
use crate::serializer::{JsonSerializer, Serializer};

/// In-memory queue driver.
#[derive(Clone)]
pub struct MemoryDriver {
    state: Arc<BrokerState>,
    serializer: Arc<dyn Serializer>,
}

struct BrokerState {
    inner: Mutex<Broker>,
    notify: Notify,
    next_receipt: AtomicU64,
    closes: AtomicUsize,
}

#[derive(Default)]
struct Broker {
    queues: BTreeMap<String, VecDeque<Stored>>,
    reserved: HashMap<String, Reserved>,
}

struct Stored {
    raw: Vec<u8>,
    visible_at: Option<Instant>,
    deliveries: u32,
}

struct Reserved {
    queue: String,
    raw: Vec<u8>,
    deliveries: u32,
}

enum Take {
    Taken(QueuedMessage),
    Empty { next_visible: Option<Instant> },
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    /// Create a fresh broker with the default JSON codec.
    pub fn new() -> Self {
        Self::with_serializer(Arc::new(JsonSerializer))
    }

    /// Create a fresh broker with a custom codec.
    pub fn with_serializer(serializer: Arc<dyn Serializer>) -> Self {
        Self {
            state: Arc::new(BrokerState {
                inner: Mutex::new(Broker::default()),
                notify: Notify::new(),
                next_receipt: AtomicU64::new(1),
                closes: AtomicUsize::new(0),
            }),
            serializer,
        }
    }

    /// How many times `close` has been called on this broker, across all
    /// connections. Diagnostic for shutdown assertions.
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    fn locked(&self) -> MutexGuard<'_, Broker> {
        self.state.inner.lock().expect("broker state poisoned")
    }

    /// Remove the first visible message from a queue, reserving it under a
    /// fresh receipt. An undecodable head is left in place and surfaced.
    fn take_visible(&self, broker: &mut Broker, queue: &str) -> Result<Take, CourierError> {
        let now = Instant::now();
        let Some(entries) = broker.queues.get_mut(queue) else {
            return Ok(Take::Empty { next_visible: None });
        };

        let mut next_visible: Option<Instant> = None;
        let mut index = None;
        for (i, stored) in entries.iter().enumerate() {
            match stored.visible_at {
                Some(at) if at > now => {
                    next_visible = Some(next_visible.map_or(at, |n: Instant| n.min(at)));
                }
                _ => {
                    index = Some(i);
                    break;
                }
            }
        }

        let Some(index) = index else {
            return Ok(Take::Empty { next_visible });
        };

        // Decode before removing so a poison payload stays in the queue.
        let message = self.serializer.deserialize(&entries[index].raw)?;

        let mut stored = entries.remove(index).expect("indexed entry present");
        stored.deliveries += 1;

        let receipt = self.state.next_receipt.fetch_add(1, Ordering::SeqCst);
        let token = format!("m-{receipt}");
        let delivery = QueuedMessage::new(
            message,
            stored.raw.clone(),
            DeliveryHandle::new(token.clone()),
            stored.deliveries,
        );

        broker.reserved.insert(
            token,
            Reserved {
                queue: queue.to_string(),
                raw: stored.raw,
                deliveries: stored.deliveries,
            },
        );

        Ok(Take::Taken(delivery))
    }
}

#[async_trait]
impl QueueDriver for MemoryDriver {
    async fn push(&self, message: &crate::message::Message) -> Result<(), CourierError> {
        let queue = message
            .destination()
            .ok_or_else(|| CourierError::server("message has no destination"))?
            .to_string();
        let raw = self.serializer.serialize(message)?;
        self.push_raw(&queue, &raw, message.delay()).await
    }

    async fn push_raw(
        &self,
        queue: &str,
        payload: &[u8],
        delay: Option<Duration>,
    ) -> Result<(), CourierError> {
        {
            let mut broker = self.locked();
            broker.queues.entry(queue.to_string()).or_default().push_back(Stored {
                raw: payload.to_vec(),
                visible_at: delay.map(|d| Instant::now() + d),
                deliveries: 0,
            });
        }
        debug!(queue = %queue, "Pushed message");
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, wait: Wait) -> Result<Option<QueuedMessage>, CourierError> {
        let deadline = match wait {
            Wait::NoWait => Some(Instant::now()),
            Wait::For(d) => Some(Instant::now() + d),
            Wait::Forever => None,
        };

        loop {
            // Register for wakeups before checking state, or a push landing
            // between the check and the await is lost.
            let mut notified = std::pin::pin!(self.state.notify.notified());
            notified.as_mut().enable();

            let next_visible = {
                let mut broker = self.locked();
                match self.take_visible(&mut broker, queue)? {
                    Take::Taken(delivery) => return Ok(Some(delivery)),
                    Take::Empty { next_visible } => next_visible,
                }
            };

            let now = Instant::now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Ok(None);
                }
            }

            let mut wake = deadline;
            if let Some(visible) = next_visible {
                wake = Some(wake.map_or(visible, |w| w.min(visible)));
            }

            match wake {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn acknowledge(&self, message: &QueuedMessage) -> Result<(), CourierError> {
        let mut broker = self.locked();
        broker.reserved.remove(message.handle().token());
        Ok(())
    }

    async fn release(&self, message: &QueuedMessage) -> Result<(), CourierError> {
        let entry = {
            let mut broker = self.locked();
            let Some(reserved) = broker.reserved.remove(message.handle().token()) else {
                return Ok(());
            };
            broker
                .queues
                .entry(reserved.queue.clone())
                .or_default()
                .push_back(Stored {
                    raw: reserved.raw,
                    visible_at: None,
                    deliveries: reserved.deliveries,
                });
            reserved.queue
        };
        debug!(queue = %entry, "Released message");
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn count(&self, queue: &str) -> Result<u64, CourierError> {
        let broker = self.locked();
        Ok(broker.queues.get(queue).map_or(0, |q| q.len() as u64))
    }

    async fn stats(&self) -> Result<DriverStats, CourierError> {
        let broker = self.locked();
        let mut reserved_per_queue: HashMap<&str, u64> = HashMap::new();
        for reserved in broker.reserved.values() {
            *reserved_per_queue.entry(reserved.queue.as_str()).or_default() += 1;
        }
        let queues = broker
            .queues
            .iter()
            .map(|(name, entries)| QueueStats {
                name: name.clone(),
                ready: entries.len() as u64,
                reserved: reserved_per_queue.get(name.as_str()).copied().unwrap_or(0),
            })
            .collect();
        Ok(DriverStats { queues })
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        debug!("Closed connection");
        Ok(())
    }

    fn reserve(&self) -> Option<&dyn ReserveQueues> {
        Some(self)
    }

    fn inspect(&self) -> Option<&dyn InspectQueues> {
        Some(self)
    }

    fn manage(&self) -> Option<&dyn ManageQueues> {
        Some(self)
    }
}

#[async_trait]
impl ReserveQueues for MemoryDriver {
    async fn reserve_batch(
        &self,
        queue: &str,
        count: usize,
        wait: Wait,
    ) -> Result<Vec<QueuedMessage>, CourierError> {
        let mut reserved = Vec::new();
        if count == 0 {
            return Ok(reserved);
        }

        // The first message honors the caller's wait; the rest of the batch
        // is whatever is immediately available.
        match self.pop(queue, wait).await? {
            Some(delivery) => reserved.push(delivery),
            None => return Ok(reserved),
        }
        while reserved.len() < count {
            match self.pop(queue, Wait::NoWait).await? {
                Some(delivery) => reserved.push(delivery),
                None => break,
            }
        }
        Ok(reserved)
    }
}

#[async_trait]
impl InspectQueues for MemoryDriver {
    async fn peek(
        &self,
        queue: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<QueuedMessage>, CourierError> {
        let raw_page: Vec<(Vec<u8>, u32)> = {
            let broker = self.locked();
            broker
                .queues
                .get(queue)
                .map(|entries| {
                    entries
                        .iter()
                        .skip(page * page_size)
                        .take(page_size)
                        .map(|s| (s.raw.clone(), s.deliveries))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut out = Vec::with_capacity(raw_page.len());
        for (i, (raw, deliveries)) in raw_page.into_iter().enumerate() {
            let message = self.serializer.deserialize(&raw)?;
            out.push(QueuedMessage::new(
                message,
                raw,
                DeliveryHandle::new(format!("peek-{i}")),
                deliveries.max(1),
            ));
        }
        Ok(out)
    }
}

#[async_trait]
impl ManageQueues for MemoryDriver {
    async fn declare_queue(&self, queue: &str) -> Result<(), CourierError> {
        let mut broker = self.locked();
        broker.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), CourierError> {
        let mut broker = self.locked();
        broker.queues.remove(queue);
        broker.reserved.retain(|_, r| r.queue != queue);
        Ok(())
    }

    async fn queue_names(&self) -> Result<Vec<String>, CourierError> {
        let broker = self.locked();
        Ok(broker.queues.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn message(n: i64, queue: &str) -> Message {
        Message::new(serde_json::json!({ "n": n })).with_destination(queue)
    }

    #[tokio::test]
    async fn test_push_pop_acknowledge() {
        let driver = MemoryDriver::new();
        driver.push(&message(1, "jobs")).await.unwrap();

        let delivery = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        assert_eq!(delivery.message().data()["n"], 1);
        assert_eq!(delivery.attempt(), 1);

        driver.acknowledge(&delivery).await.unwrap();
        assert!(driver.pop("jobs", Wait::NoWait).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_keeps_message_and_next_pop_counts_redelivery() {
        let driver = MemoryDriver::new();
        driver.push(&message(7, "jobs")).await.unwrap();

        let first = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        assert_eq!(first.attempt(), 1);
        driver.release(&first).await.unwrap();

        let second = driver.pop("jobs", Wait::NoWait).await.unwrap().unwrap();
        assert_eq!(second.attempt(), 2);
        assert!(second.is_redelivery());
    }

    #[tokio::test]
    async fn test_pop_empty_no_wait() {
        let driver = MemoryDriver::new();
        assert!(driver.pop("missing", Wait::NoWait).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blocking_pop_wakes_on_push() {
        let driver = MemoryDriver::new();
        let popper = driver.clone();

        let handle = tokio::spawn(async move {
            popper.pop("jobs", Wait::For(Duration::from_secs(5))).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        driver.push(&message(1, "jobs")).await.unwrap();

        let delivery = handle.await.unwrap().unwrap();
        assert!(delivery.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_hides_message_until_visible() {
        let driver = MemoryDriver::new();
        let delayed = message(1, "jobs").with_delay(Duration::from_secs(30));
        driver.push(&delayed).await.unwrap();

        assert!(driver.pop("jobs", Wait::NoWait).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(driver.pop("jobs", Wait::NoWait).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_poison_payload_is_left_in_place() {
        let driver = MemoryDriver::new();
        driver.push_raw("jobs", b"not json", None).await.unwrap();

        let err = driver.pop("jobs", Wait::NoWait).await.unwrap_err();
        assert!(err.is_serialization_error());
        assert_eq!(driver.count("jobs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reserve_batch() {
        let driver = MemoryDriver::new();
        for n in 0..3 {
            driver.push(&message(n, "jobs")).await.unwrap();
        }

        let reserve = driver.reserve().expect("memory driver reserves");
        let batch = reserve.reserve_batch("jobs", 2, Wait::NoWait).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(driver.count("jobs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_peek_is_non_destructive() {
        let driver = MemoryDriver::new();
        for n in 0..5 {
            driver.push(&message(n, "jobs")).await.unwrap();
        }

        let inspect = driver.inspect().expect("memory driver inspects");
        let first_page = inspect.peek("jobs", 2, 0).await.unwrap();
        let second_page = inspect.peek("jobs", 2, 1).await.unwrap();

        assert_eq!(first_page.len(), 2);
        assert_eq!(second_page.len(), 2);
        assert_eq!(first_page[0].message().data()["n"], 0);
        assert_eq!(second_page[0].message().data()["n"], 2);
        assert_eq!(driver.count("jobs").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_manage_and_stats() {
        let driver = MemoryDriver::new();
        let manage = driver.manage().expect("memory driver manages");

        manage.declare_queue("a").await.unwrap();
        manage.declare_queue("b").await.unwrap();
        driver.push(&message(1, "a")).await.unwrap();

        let names = manage.queue_names().await.unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        let popped = driver.pop("a", Wait::NoWait).await.unwrap().unwrap();
        let stats = driver.stats().await.unwrap();
        let a = stats.queues.iter().find(|q| q.name == "a").unwrap();
        assert_eq!(a.ready, 0);
        assert_eq!(a.reserved, 1);
        driver.acknowledge(&popped).await.unwrap();

        manage.delete_queue("a").await.unwrap();
        assert_eq!(manage.queue_names().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_close_count_is_shared_across_clones() {
        let driver = MemoryDriver::new();
        let connection = driver.clone();

        connection.close().await.unwrap();
        assert_eq!(driver.close_count(), 1);
    }
}
