// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bus client: owns the connection to the durable, partitioned message
//! bus and the lifecycle of the destination topic.

use crate::config::IngestConfig;
use crate::framing::FramedRecord;
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors surfaced by the bus client.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to message bus: {0}")]
    Connect(#[source] KafkaError),

    #[error("failed to create topic: {0}")]
    TopicCreate(String),

    #[error("failed to produce record: {0}")]
    Produce(#[source] KafkaError),

    #[error("delivery acknowledgement lost: producer task ended without reporting an outcome")]
    AckLost,
}

/// The subset of bus operations the worker pool and supervisor depend
/// on. Lets tests substitute an in-memory double without a live broker.
#[async_trait]
pub trait BusProducer: Send + Sync {
    async fn ensure_topic(&self, name: &str, partitions: u32, replication: u16) -> Result<(), BusError>;

    /// Enqueues `record` and returns immediately. The batching and
    /// network I/O that follow happen off the caller's task; the
    /// returned receiver resolves exactly once, with the delivery
    /// outcome, whenever the bus acknowledges or rejects the record.
    fn produce(&self, record: FramedRecord) -> oneshot::Receiver<Result<(), BusError>>;

    async fn close(&self, timeout: Duration);
}

/// `rdkafka`-backed bus client.
pub struct BusClient {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    topic: String,
}

impl BusClient {
    /// Build a client and admin handle from the resolved configuration.
    pub fn connect(config: &IngestConfig) -> Result<Self, BusError> {
        let brokers = config.brokers.join(",");

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "30000")
            .set("acks", "all")
            .set("compression.type", "lz4")
            .set("linger.ms", "1000")
            .set("api.version.request", "true");

        if config.auth_iam {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanism", "OAUTHBEARER");
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(BusError::Connect)?;
        let admin: AdminClient<DefaultClientContext> = client_config
            .create()
            .map_err(BusError::Connect)?;

        Ok(Self {
            producer,
            admin,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl BusProducer for BusClient {
    async fn ensure_topic(&self, name: &str, partitions: u32, replication: u16) -> Result<(), BusError> {
        let new_topic = NewTopic::new(
            name,
            partitions as i32,
            TopicReplication::Fixed(replication as i32),
        );
        let results = self
            .admin
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| BusError::TopicCreate(e.to_string()))?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((topic, code)) => {
                    tracing::warn!(topic = %topic, ?code, "topic create returned error");
                    return Err(BusError::TopicCreate(format!("{topic}: {code:?}")));
                }
            }
        }
        Ok(())
    }

    fn produce(&self, record: FramedRecord) -> oneshot::Receiver<Result<(), BusError>> {
        let (tx, rx) = oneshot::channel();
        let producer = self.producer.clone();
        let topic = self.topic.clone();

        // The delivery future only resolves once rdkafka's producer
        // thread reports an ack, so it is driven on its own task rather
        // than awaited here — produce() must return before that happens.
        tokio::spawn(async move {
            let payload = record.encode();
            let future_record: FutureRecord<'_, (), Vec<u8>> =
                FutureRecord::to(&topic).payload(&payload);

            let result = match producer.send(future_record, Duration::from_secs(0)).await {
                Ok(_) => Ok(()),
                Err((err, _owned_message)) => Err(BusError::Produce(err)),
            };
            let _ = tx.send(result);
        });

        rx
    }

    async fn close(&self, timeout: Duration) {
        // `flush` blocks the calling thread briefly; acceptable at shutdown.
        let _ = self.producer.flush(timeout);
    }
}
