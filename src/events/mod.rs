//! Events Module
//!
//! Change notifications for books. Writers publish through an
//! [`EventPublisher`]; the background consumer reads through an
//! [`EventSource`]. Kafka backs both in production, the in-memory bus in
//! tests.
//!
//! ```text
//!   BookService ──publish──▶ topic ──subscribe──▶ consumer task ──▶ EventHandler
//! ```

mod kafka;
mod memory;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ConsumeError, PublishError};
use crate::models::Book;
use crate::tasks::ConsumerStatus;

pub use kafka::{KafkaEventSource, KafkaPublisher};
pub use memory::MemoryEventBus;

// == Payloads ==
/// A change to a book, rendered as the human-readable topic payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    Created { title: String, author: String },
    Updated { title: String, author: String },
    Deleted { id: i64 },
}

impl BookEvent {
    pub fn created(book: &Book) -> Self {
        BookEvent::Created {
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }

    pub fn updated(book: &Book) -> Self {
        BookEvent::Updated {
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }

    pub fn deleted(id: i64) -> Self {
        BookEvent::Deleted { id }
    }

    /// Short operation name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            BookEvent::Created { .. } => "created",
            BookEvent::Updated { .. } => "updated",
            BookEvent::Deleted { .. } => "deleted",
        }
    }
}

impl fmt::Display for BookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookEvent::Created { title, author } => write!(f, "Book created: {} by {}", title, author),
            BookEvent::Updated { title, author } => write!(f, "Book updated: {} by {}", title, author),
            BookEvent::Deleted { id } => write!(f, "Book deleted with id: {}", id),
        }
    }
}

/// Parses a topic payload back into the event it was rendered from.
impl FromStr for BookEvent {
    type Err = ConsumeError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let by = |rest: &str| {
            rest.rsplit_once(" by ").map(|(title, author)| (title.to_string(), author.to_string()))
        };
        let parsed = if let Some(rest) = payload.strip_prefix("Book created: ") {
            by(rest).map(|(title, author)| BookEvent::Created { title, author })
        } else if let Some(rest) = payload.strip_prefix("Book updated: ") {
            by(rest).map(|(title, author)| BookEvent::Updated { title, author })
        } else if let Some(rest) = payload.strip_prefix("Book deleted with id: ") {
            rest.trim().parse().ok().map(|id| BookEvent::Deleted { id })
        } else {
            None
        };

        parsed.ok_or_else(|| ConsumeError::Handler(format!("unrecognised event payload: {}", payload)))
    }
}

// == Publishing ==
/// Writes one message to a topic and waits for the broker to acknowledge it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// How hard to try before giving up on a notification.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Publishes `payload`, retrying transient failures up to the policy bound.
///
/// Fatal errors are returned immediately; after the last retry the last
/// transient error is returned.
pub async fn publish_with_retry(
    publisher: &dyn EventPublisher,
    topic: &str,
    payload: &[u8],
    policy: RetryPolicy,
) -> Result<(), PublishError> {
    let mut attempt = 0;
    loop {
        match publisher.publish(topic, payload).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(topic, attempt, error = %e, "Publish failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// == Consuming ==
/// One message read from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
}

/// Creates group subscriptions on the bus.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Joins `group` and subscribes to `topic`. Backends report group
    /// rebalances through `status`.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        status: ConsumerStatus,
    ) -> Result<Box<dyn Subscription>, ConsumeError>;
}

/// A live group subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next message. An error means the subscription is broken.
    async fn next(&mut self) -> Result<Delivery, ConsumeError>;

    /// Marks `delivery` as processed for the group.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), ConsumeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn dune() -> Book {
        Book {
            id: 1,
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            year: 1965,
        }
    }

    #[test]
    fn test_payload_formats() {
        assert_eq!(BookEvent::created(&dune()).to_string(), "Book created: Dune by Herbert");
        assert_eq!(BookEvent::updated(&dune()).to_string(), "Book updated: Dune by Herbert");
        assert_eq!(BookEvent::deleted(1).to_string(), "Book deleted with id: 1");
    }

    #[test]
    fn test_parse_payloads() {
        let created: BookEvent = "Book created: Dune by Herbert".parse().unwrap();
        assert_eq!(created, BookEvent::created(&dune()));

        let updated: BookEvent = "Book updated: Stand by Me by King".parse().unwrap();
        assert_eq!(
            updated,
            BookEvent::Updated {
                title: "Stand by Me".to_string(),
                author: "King".to_string(),
            }
        );

        let deleted: BookEvent = "Book deleted with id: 12".parse().unwrap();
        assert_eq!(deleted, BookEvent::deleted(12));
    }

    #[test]
    fn test_parse_rejects_unknown_payloads() {
        for payload in ["hello", "Book created: no author", "Book deleted with id: x"] {
            let err = payload.parse::<BookEvent>().unwrap_err();
            assert!(matches!(err, ConsumeError::Handler(_)));
        }
    }

    /// Fails with the given error for the first `failures` calls.
    struct FlakyPublisher {
        failures: u32,
        error: PublishError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), PublishError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let publisher = FlakyPublisher {
            failures: 3,
            error: PublishError::Transient("broker down".into()),
            calls: AtomicU32::new(0),
        };
        publish_with_retry(&publisher, "t", b"x", quick_policy()).await.unwrap();
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_bound() {
        let publisher = FlakyPublisher {
            failures: u32::MAX,
            error: PublishError::Transient("broker down".into()),
            calls: AtomicU32::new(0),
        };
        let result = publish_with_retry(&publisher, "t", b"x", quick_policy()).await;
        assert!(matches!(result, Err(PublishError::Transient(_))));
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_fatal_errors() {
        let publisher = FlakyPublisher {
            failures: u32::MAX,
            error: PublishError::Fatal("message too large".into()),
            calls: AtomicU32::new(0),
        };
        let result = publish_with_retry(&publisher, "t", b"x", quick_policy()).await;
        assert!(matches!(result, Err(PublishError::Fatal(_))));
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    }
}
