//! Kafka forwarding for lifecycle events, enabled with the `kafka` feature.

use async_trait::async_trait;
use hearth_core::{EventSink, NotifyError};
use hearth_shared::LifecycleEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct KafkaEventSink {
    producer: FutureProducer,
    topic_prefix: String,
}

impl KafkaEventSink {
    pub fn new(brokers: &str, topic_prefix: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    fn topic_for(&self, event: &LifecycleEvent) -> String {
        format!("{}.{}", self.topic_prefix, event.topic)
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn forward(&self, event: &LifecycleEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event).map_err(|e| NotifyError::Serialization(e.to_string()))?;
        let topic = self.topic_for(event);
        let key = event.key();

        let record = FutureRecord::to(&topic).key(&key).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent {} to {}: partition {} offset {}", key, topic, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(NotifyError::Sink(e.to_string()))
            }
        }
    }
}
