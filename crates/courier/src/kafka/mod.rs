//! rdkafka adapters for the consumer source and the publisher sink.

mod offsets;
mod sink;
mod source;

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tracing::{info, warn};

pub use offsets::{OffsetTracker, RedeliveryQueue};
pub use sink::KafkaSink;
pub use source::KafkaSource;

use crate::config::Settings;
use crate::error::{CourierError, Result};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

fn base_config(settings: &Settings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", settings.bootstrap_servers());
    config
}

/// Ask the brokers for the consumer topic's metadata before any worker starts.
pub async fn check_connectivity(settings: &Settings) -> Result<()> {
    let bootstrap = settings.bootstrap_servers();
    let topic = settings.kafka.consumer_topic.clone();
    let client: BaseConsumer = base_config(settings).create()?;

    let partitions = tokio::task::spawn_blocking(move || {
        client
            .fetch_metadata(Some(topic.as_str()), METADATA_TIMEOUT)
            .map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .filter(|t| t.name() == topic)
                    .map(|t| t.partitions().len())
                    .sum::<usize>()
            })
    })
    .await
    .map_err(|e| CourierError::BrokerUnreachable(e.to_string()))?
    .map_err(|e| CourierError::BrokerUnreachable(format!("{bootstrap}: {e}")))?;

    if partitions == 0 {
        warn!(brokers = %bootstrap, topic = %settings.kafka.consumer_topic, "topic has no partitions yet");
    }
    info!(brokers = %bootstrap, partitions, "kafka connection verified");
    Ok(())
}
