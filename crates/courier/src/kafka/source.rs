use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::Offset;
use rdkafka::TopicPartitionList;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use tokio::time::Instant;
use tracing::{debug, info};

use super::base_config;
use super::offsets::{OffsetTracker, RedeliveryQueue};
use crate::config::Settings;
use crate::consumer::{CommitError, FetchError, MessageSource, SourceMessage};
use crate::error::Result;

/// Group member on the inbound topic with auto-commit disabled.
///
/// Every fetched offset stays in flight until it is committed, and a commit
/// never moves a partition past its lowest in-flight offset. A rewound message
/// keeps its place in flight and is handed out again from a local queue once
/// `redelivery_delay` has passed, so no other offset is fetched twice.
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
    redelivery_delay: Duration,
    offsets: Mutex<OffsetTracker>,
    redeliveries: Mutex<RedeliveryQueue>,
}

impl KafkaSource {
    pub fn new(settings: &Settings) -> Result<Self> {
        let heartbeat = settings.consumer.heartbeat_interval();
        let session = heartbeat * 10;

        let consumer: StreamConsumer = base_config(settings)
            .set("group.id", &settings.kafka.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest")
            .set("fetch.wait.max.ms", millis(settings.consumer.max_wait()))
            .set("heartbeat.interval.ms", millis(heartbeat))
            .set("session.timeout.ms", millis(session))
            .create()?;

        consumer.subscribe(&[&settings.kafka.consumer_topic])?;
        info!(
            topic = %settings.kafka.consumer_topic,
            group_id = %settings.kafka.group_id,
            "subscribed to inbound topic"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: settings.kafka.consumer_topic.clone(),
            redelivery_delay: settings.consumer.retry_backoff(),
            offsets: Mutex::new(OffsetTracker::new()),
            redeliveries: Mutex::new(RedeliveryQueue::new()),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn offsets(&self) -> MutexGuard<'_, OffsetTracker> {
        self.offsets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn redeliveries(&self) -> MutexGuard<'_, RedeliveryQueue> {
        self.redeliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn received(&self, message: &BorrowedMessage<'_>) -> SourceMessage {
        let message = SourceMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        };
        self.offsets()
            .begin(&message.topic, message.partition, message.offset);
        message
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}

fn classify(error: KafkaError) -> FetchError {
    match error.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut,
        ) => FetchError::Transient(error.to_string()),
        _ => FetchError::from_message(error.to_string()),
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn fetch(&self) -> std::result::Result<SourceMessage, FetchError> {
        loop {
            let next_due = {
                let mut redeliveries = self.redeliveries();
                if let Some(message) = redeliveries.take_due(Instant::now()) {
                    debug!(position = %message.position(), "redelivering message");
                    return Ok(message);
                }
                redeliveries.next_due()
            };

            let redelivery_due = async {
                match next_due {
                    Some(due) => tokio::time::sleep_until(due).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                received = self.consumer.recv() => {
                    return received.map(|m| self.received(&m)).map_err(classify);
                }
                _ = redelivery_due => {}
            }
        }
    }

    async fn commit(&self, message: &SourceMessage) -> std::result::Result<(), CommitError> {
        let Some(next) = self
            .offsets()
            .complete(&message.topic, message.partition, message.offset)
        else {
            debug!(position = %message.position(), "lower offset still in flight, commit deferred");
            return Ok(());
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(next))
            .map_err(|e| CommitError::new(message, e.to_string()))?;

        let consumer = self.consumer.clone();
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .map_err(|e| CommitError::new(message, e.to_string()))?
            .map_err(|e| CommitError::new(message, e.to_string()))?;

        self.offsets()
            .committed(&message.topic, message.partition, next);
        Ok(())
    }

    async fn rewind(&self, message: &SourceMessage) -> std::result::Result<(), FetchError> {
        let due = Instant::now() + self.redelivery_delay;
        self.redeliveries().push(due, message.clone());
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), FetchError> {
        self.consumer.unsubscribe();
        let abandoned = self.redeliveries().len();
        info!(topic = %self.topic, abandoned, "left consumer group");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::FetchClass;

    #[test]
    fn test_broker_outages_are_transient() {
        for code in [
            RDKafkaErrorCode::BrokerTransportFailure,
            RDKafkaErrorCode::AllBrokersDown,
            RDKafkaErrorCode::RequestTimedOut,
        ] {
            let err = classify(KafkaError::MessageConsumption(code));
            assert_eq!(err.class(), FetchClass::Transient, "{code:?}");
        }
    }

    #[test]
    fn test_authorization_failure_is_other() {
        let err = classify(KafkaError::MessageConsumption(
            RDKafkaErrorCode::TopicAuthorizationFailed,
        ));
        assert_eq!(err.class(), FetchClass::Other);
    }

    #[test]
    fn test_millis() {
        assert_eq!(millis(Duration::from_secs(3)), "3000");
    }
}
