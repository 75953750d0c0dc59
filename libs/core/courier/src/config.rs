//! Configuration types for consumers, retries and topic routing.

use std::time::Duration;

use crate::driver::Wait;

/// Consumer configuration.
///
/// Backend-agnostic: the same configuration drives queue and topic
/// consumers regardless of the transport underneath.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer id (unique per worker instance).
    pub consumer_id: String,

    /// How long each read/poll call may block.
    pub wait: Wait,

    /// Bulk-reserve this many messages per round-trip, when the driver
    /// supports reservation. `None` reads one at a time.
    pub prefetch: Option<usize>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_id: format!("consumer-{}", uuid::Uuid::new_v4()),
            wait: Wait::For(Duration::from_secs(5)),
            prefetch: None,
        }
    }
}

impl ConsumerConfig {
    /// Create a consumer configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the consumer id.
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the per-read wait.
    pub fn with_wait(mut self, wait: Wait) -> Self {
        self.wait = wait;
        self
    }

    /// Enable bulk reservation with the given prefetch size.
    pub fn with_prefetch(mut self, size: usize) -> Self {
        self.prefetch = Some(size);
        self
    }
}

/// Naming convention for topics emulated over plain queues.
#[derive(Debug, Clone)]
pub struct TopicRouting {
    /// Separator between the consumer-group prefix and the topic pattern in
    /// emulated queue names.
    pub separator: String,

    /// The transport's wildcard token; pattern wildcards are rewritten to
    /// this when forming queue names.
    pub wildcard: String,
}

impl Default for TopicRouting {
    fn default() -> Self {
        Self {
            separator: "/".to_string(),
            wildcard: "*".to_string(),
        }
    }
}

impl TopicRouting {
    /// Create a routing convention with defaults (`/` separator, `*`
    /// wildcard).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the group/topic separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the transport wildcard token.
    pub fn with_wildcard(mut self, wildcard: impl Into<String>) -> Self {
        self.wildcard = wildcard.into();
        self
    }
}

/// Retry policy applied by the retry receiver.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delivery attempts allowed before a message is dropped, unless the
    /// message carries its own max-try count.
    pub max_tries: u32,

    /// Backoff strategy between attempts.
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 3,
            backoff: BackoffStrategy::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy with the given attempt cap.
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries,
            ..Default::default()
        }
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed(Duration),

    /// Exponential backoff (base * 2^attempt, capped at max).
    Exponential { base: Duration, max: Duration },

    /// Linear backoff (base * (attempt + 1), capped at max).
    Linear { base: Duration, max: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt count.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(d) => *d,
            BackoffStrategy::Exponential { base, max } => {
                let delay = base.saturating_mul(2u32.saturating_pow(attempt));
                delay.min(*max)
            }
            BackoffStrategy::Linear { base, max } => {
                let delay = base.saturating_mul(attempt + 1);
                delay.min(*max)
            }
        }
    }
}
