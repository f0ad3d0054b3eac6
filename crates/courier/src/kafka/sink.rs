use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use super::base_config;
use crate::config::Settings;
use crate::error::Result;
use crate::publisher::{MessageSink, PublishError};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Producer writing notification requests to the outbound topic.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaSink {
    pub fn new(settings: &Settings) -> Result<Self> {
        let producer: FutureProducer = base_config(settings)
            .set("message.timeout.ms", DELIVERY_TIMEOUT.as_millis().to_string())
            .create()?;

        Ok(Self {
            producer,
            topic: settings.kafka.producer_topic.clone(),
        })
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn send(&self, key: &[u8], payload: &[u8]) -> std::result::Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self.producer.send(record, DELIVERY_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(PublishError::Send(e.to_string())),
        }
    }

    async fn flush(&self) -> std::result::Result<(), PublishError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(|e| PublishError::Send(e.to_string()))?
            .map_err(|e| PublishError::Send(e.to_string()))
    }
}
