//! Event Consumer Task
//!
//! Long-lived background task that keeps a group subscription on the book
//! change topic and hands every message to an [`EventHandler`].
//!
//! ```text
//! Unstarted → Subscribing → Running ⇄ Rebalancing
//!                 ▲            │
//!                 └── error ───┘            shutdown → Stopped
//! ```
//!
//! Delivery is at-least-once: the offset is committed only after the
//! handler returns, so a crash or resubscribe may replay messages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ConsumeError;
use crate::events::{BookEvent, Delivery, EventSource};

/// Lifecycle of the consumer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsumerState {
    Unstarted,
    Subscribing,
    Running,
    Rebalancing,
    Stopped,
}

/// Shared, observable consumer state.
#[derive(Debug, Clone)]
pub struct ConsumerStatus {
    tx: Arc<watch::Sender<ConsumerState>>,
}

impl Default for ConsumerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerStatus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConsumerState::Unstarted);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: ConsumerState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "Consumer state changed");
        }
    }

    pub fn get(&self) -> ConsumerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.tx.subscribe()
    }
}

/// Processes one consumed message. Must tolerate redelivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), ConsumeError>;
}

/// Default handler: logs the notification and acknowledges it.
///
/// Payloads that are not book change notifications are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), ConsumeError> {
        let event: BookEvent = delivery.payload.parse()?;
        info!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            kind = event.kind(),
            "Consumed message: {}",
            event
        );
        Ok(())
    }
}

/// Resubscribe backoff.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Handle to the spawned consumer task.
pub struct ConsumerHandle {
    status: ConsumerStatus,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        self.status.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.status.subscribe()
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        self.join.abort();
        let _ = self.join.await;
        self.status.set(ConsumerState::Stopped);
        info!("Event consumer stopped");
    }
}

/// Spawns the consumer with default backoff.
///
/// # Example
/// ```ignore
/// let handle = spawn_event_consumer(source, "book_events", "book-events-group", Arc::new(LoggingHandler));
/// // Later, during shutdown:
/// handle.shutdown().await;
/// ```
pub fn spawn_event_consumer(
    source: Arc<dyn EventSource>,
    topic: impl Into<String>,
    group: impl Into<String>,
    handler: Arc<dyn EventHandler>,
) -> ConsumerHandle {
    spawn_event_consumer_with(source, topic, group, handler, ConsumerOptions::default())
}

pub fn spawn_event_consumer_with(
    source: Arc<dyn EventSource>,
    topic: impl Into<String>,
    group: impl Into<String>,
    handler: Arc<dyn EventHandler>,
    options: ConsumerOptions,
) -> ConsumerHandle {
    let status = ConsumerStatus::new();
    let join = tokio::spawn(run_consumer(
        source,
        topic.into(),
        group.into(),
        handler,
        status.clone(),
        options,
    ));
    ConsumerHandle { status, join }
}

async fn run_consumer(
    source: Arc<dyn EventSource>,
    topic: String,
    group: String,
    handler: Arc<dyn EventHandler>,
    status: ConsumerStatus,
    options: ConsumerOptions,
) {
    let mut backoff = options.initial_backoff;
    info!(%topic, %group, "Starting event consumer");

    loop {
        status.set(ConsumerState::Subscribing);
        let mut subscription = match source.subscribe(&topic, &group, status.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(%topic, error = %e, ?backoff, "Subscribe failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(options.max_backoff);
                continue;
            }
        };
        status.set(ConsumerState::Running);

        loop {
            let delivery = match subscription.next().await {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(%topic, error = %e, "Consumer transport error, resubscribing");
                    break;
                }
            };

            if let Err(e) = handler.handle(&delivery).await {
                warn!(offset = delivery.offset, error = %e, "Event handler failed");
            }
            if let Err(e) = subscription.commit(&delivery).await {
                warn!(offset = delivery.offset, error = %e, "Offset commit failed");
            }
            backoff = options.initial_backoff;
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(options.max_backoff);
    }
}
