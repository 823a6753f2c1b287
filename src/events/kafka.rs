//! Kafka backend for the event bus.
//!
//! The producer is created once and shared; each publish waits for
//! acknowledgement from all in-sync replicas. The consumer joins a group,
//! commits offsets manually after the handler has seen each message, and
//! reports group rebalances to the consumer task.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{Delivery, EventPublisher, EventSource, Subscription};
use crate::config::KafkaConfig;
use crate::error::{ConsumeError, PublishError};
use crate::tasks::{ConsumerState, ConsumerStatus};

/// Upper bound for one delivery attempt, including broker acknowledgement
const MESSAGE_TIMEOUT_MS: &str = "10000";

/// How long `send` may wait for room in the local producer queue
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker errors that may succeed when tried again.
fn is_retriable(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::NotEnoughReplicas
            | RDKafkaErrorCode::NotEnoughReplicasAfterAppend
    )
}

fn classify(err: KafkaError) -> PublishError {
    match err.rdkafka_error_code() {
        Some(code) if is_retriable(code) => PublishError::Transient(err.to_string()),
        _ => PublishError::Fatal(err.to_string()),
    }
}

fn transport(err: KafkaError) -> ConsumeError {
    ConsumeError::Transport(err.to_string())
}

// == Producer ==
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, PublishError> {
        // Retries are bounded by publish_with_retry, not by librdkafka.
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers())
            .set("acks", "all")
            .set("message.send.max.retries", "0")
            .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
            .create()
            .map_err(|e| PublishError::Fatal(e.to_string()))?;
        info!(brokers = %config.brokers(), "Kafka producer created");
        Ok(Self { producer })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(payload);
        match self.producer.send(record, QUEUE_TIMEOUT).await {
            Ok(delivery) => {
                debug!(topic, ?delivery, "Event acknowledged");
                Ok(())
            }
            Err((err, _message)) => Err(classify(err)),
        }
    }
}

// == Consumer ==
/// Forwards group rebalances into the consumer state.
struct RebalanceContext {
    status: ConsumerStatus,
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        info!(?rebalance, "Consumer group rebalancing");
        self.status.set(ConsumerState::Rebalancing);
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        info!(?rebalance, "Consumer group rebalance complete");
        self.status.set(ConsumerState::Running);
    }
}

pub struct KafkaEventSource {
    brokers: String,
}

impl KafkaEventSource {
    pub fn new(config: &KafkaConfig) -> Self {
        Self {
            brokers: config.brokers(),
        }
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        status: ConsumerStatus,
    ) -> Result<Box<dyn Subscription>, ConsumeError> {
        let consumer: StreamConsumer<RebalanceContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create_with_context(RebalanceContext { status })
            .map_err(transport)?;
        consumer.subscribe(&[topic]).map_err(transport)?;
        info!(topic, group, brokers = %self.brokers, "Kafka consumer subscribed");

        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer<RebalanceContext>,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next(&mut self) -> Result<Delivery, ConsumeError> {
        let message = self.consumer.recv().await.map_err(transport)?;
        Ok(Delivery {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: String::from_utf8_lossy(message.payload().unwrap_or_default()).into_owned(),
        })
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), ConsumeError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset + 1),
            )
            .map_err(transport)?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(transport)
    }
}
