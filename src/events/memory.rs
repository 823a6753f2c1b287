//! In-memory event bus.
//!
//! Each topic is an append-only log with a single partition. Subscriptions
//! start at their group's committed offset, so a resubscribing group
//! re-reads everything it has not committed. A rebalance can be started and
//! finished by hand; while it runs, subscriptions deliver nothing and their
//! consumers report `Rebalancing`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Delivery, EventPublisher, EventSource, Subscription};
use crate::error::{ConsumeError, PublishError};
use crate::tasks::{ConsumerState, ConsumerStatus};

#[derive(Debug, Default)]
struct BusState {
    logs: HashMap<String, Vec<Delivery>>,
    /// Next offset to read, per (topic, group)
    committed: HashMap<(String, String), i64>,
    /// Status of the latest subscriber, per (topic, group)
    members: HashMap<(String, String), ConsumerStatus>,
}

#[derive(Debug)]
struct BusInner {
    state: Mutex<BusState>,
    notify: Notify,
    online: AtomicBool,
    rebalancing: AtomicBool,
    failures_left: AtomicU32,
}

/// Cheaply cloneable handle to a shared in-memory bus.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    inner: Arc<BusInner>,
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                notify: Notify::new(),
                online: AtomicBool::new(true),
                rebalancing: AtomicBool::new(false),
                failures_left: AtomicU32::new(0),
            }),
        }
    }

    /// While offline, publishes fail transiently and subscriptions break.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Makes the next `count` publishes fail transiently.
    pub fn fail_next_publishes(&self, count: u32) {
        self.inner.failures_left.store(count, Ordering::SeqCst);
    }

    /// Starts a group rebalance: every subscriber moves to `Rebalancing`
    /// and stops receiving until [`finish_rebalance`](Self::finish_rebalance).
    pub fn begin_rebalance(&self) {
        self.inner.rebalancing.store(true, Ordering::SeqCst);
        for status in self.lock().members.values() {
            status.set(ConsumerState::Rebalancing);
        }
    }

    /// Completes the rebalance; subscribers return to `Running`.
    pub fn finish_rebalance(&self) {
        self.inner.rebalancing.store(false, Ordering::SeqCst);
        for status in self.lock().members.values() {
            status.set(ConsumerState::Running);
        }
        self.inner.notify.notify_waiters();
    }

    /// Payloads appended to `topic`, in offset order.
    pub fn published(&self, topic: &str) -> Vec<String> {
        self.lock()
            .logs
            .get(topic)
            .map(|log| log.iter().map(|d| d.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Next offset `group` will read from `topic`.
    pub fn committed_offset(&self, topic: &str, group: &str) -> i64 {
        self.lock()
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    fn is_rebalancing(&self) -> bool {
        self.inner.rebalancing.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // A poisoned lock only means a test panicked mid-append; the log is still usable.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.is_online() {
            return Err(PublishError::Transient("bus is offline".to_string()));
        }
        if self.take_failure() {
            return Err(PublishError::Transient("injected failure".to_string()));
        }

        {
            let mut state = self.lock();
            let log = state.logs.entry(topic.to_string()).or_default();
            let offset = log.len() as i64;
            log.push(Delivery {
                topic: topic.to_string(),
                partition: 0,
                offset,
                payload: String::from_utf8_lossy(payload).into_owned(),
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl EventSource for MemoryEventBus {
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        status: ConsumerStatus,
    ) -> Result<Box<dyn Subscription>, ConsumeError> {
        if !self.is_online() {
            return Err(ConsumeError::Transport("bus is offline".to_string()));
        }
        self.lock()
            .members
            .insert((topic.to_string(), group.to_string()), status);
        let position = self.committed_offset(topic, group);
        Ok(Box::new(MemorySubscription {
            bus: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position,
        }))
    }
}

struct MemorySubscription {
    bus: MemoryEventBus,
    topic: String,
    group: String,
    position: i64,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Delivery, ConsumeError> {
        loop {
            // Registered before checking the log so a concurrent publish is not missed
            let notified = self.bus.inner.notify.notified();

            if !self.bus.is_online() {
                return Err(ConsumeError::Transport("bus is offline".to_string()));
            }
            if self.bus.is_rebalancing() {
                notified.await;
                continue;
            }
            let next = self
                .bus
                .lock()
                .logs
                .get(&self.topic)
                .and_then(|log| log.get(self.position as usize).cloned());
            if let Some(delivery) = next {
                self.position += 1;
                return Ok(delivery);
            }

            notified.await;
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), ConsumeError> {
        let mut state = self.bus.lock();
        let committed = state
            .committed
            .entry((self.topic.clone(), self.group.clone()))
            .or_insert(0);
        *committed = (*committed).max(delivery.offset + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_appends_in_order() {
        let bus = MemoryEventBus::new();
        bus.publish("books", b"one").await.unwrap();
        bus.publish("books", b"two").await.unwrap();
        assert_eq!(bus.published("books"), vec!["one", "two"]);
        assert!(bus.published("other").is_empty());
    }

    #[tokio::test]
    async fn test_offline_publish_is_transient() {
        let bus = MemoryEventBus::new();
        bus.set_online(false);
        let err = bus.publish("books", b"x").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let bus = MemoryEventBus::new();
        bus.fail_next_publishes(2);
        assert!(bus.publish("books", b"a").await.is_err());
        assert!(bus.publish("books", b"a").await.is_err());
        assert!(bus.publish("books", b"a").await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_waits_for_new_messages() {
        let bus = MemoryEventBus::new();
        let mut sub = bus
            .subscribe("books", "g", ConsumerStatus::new())
            .await
            .unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("books", b"late").await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, "late");
        assert_eq!(delivery.offset, 0);
    }

    #[tokio::test]
    async fn test_resubscribe_resumes_from_commit() {
        let bus = MemoryEventBus::new();
        for payload in ["a", "b", "c"] {
            bus.publish("books", payload.as_bytes()).await.unwrap();
        }

        let mut sub = bus.subscribe("books", "g", ConsumerStatus::new()).await.unwrap();
        let first = sub.next().await.unwrap();
        sub.commit(&first).await.unwrap();
        let _uncommitted = sub.next().await.unwrap();
        drop(sub);

        assert_eq!(bus.committed_offset("books", "g"), 1);
        let mut sub = bus.subscribe("books", "g", ConsumerStatus::new()).await.unwrap();
        assert_eq!(sub.next().await.unwrap().payload, "b");
    }

    #[tokio::test]
    async fn test_rebalance_drives_subscriber_status() {
        let bus = MemoryEventBus::new();
        let status = ConsumerStatus::new();
        let mut sub = bus.subscribe("books", "g", status.clone()).await.unwrap();
        status.set(ConsumerState::Running);

        bus.begin_rebalance();
        assert_eq!(status.get(), ConsumerState::Rebalancing);
        bus.publish("books", b"held").await.unwrap();
        let held = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(held.is_err());

        bus.finish_rebalance();
        assert_eq!(status.get(), ConsumerState::Running);
        assert_eq!(sub.next().await.unwrap().payload, "held");
    }

    #[tokio::test]
    async fn test_going_offline_breaks_waiting_subscription() {
        let bus = MemoryEventBus::new();
        let mut sub = bus.subscribe("books", "g", ConsumerStatus::new()).await.unwrap();

        let switch = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            switch.set_online(false);
        });

        let result = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap();
        assert!(matches!(result, Err(ConsumeError::Transport(_))));
    }
}
