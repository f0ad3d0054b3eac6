use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::CourierError;

/// Kafka connection and topic settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KafkaSettings {
    /// Bootstrap brokers (env: comma separated list)
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// Topic carrying inbound user events
    #[serde(default = "default_consumer_topic")]
    pub consumer_topic: String,
    /// Consumer group shared by all workers
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Topic receiving notification requests
    #[serde(default = "default_producer_topic")]
    pub producer_topic: String,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:29092".to_string()]
}

fn default_consumer_topic() -> String {
    "user-events".to_string()
}

fn default_group_id() -> String {
    "kafka-listener-group".to_string()
}

fn default_producer_topic() -> String {
    "notifications".to_string()
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            consumer_topic: default_consumer_topic(),
            group_id: default_group_id(),
            producer_topic: default_producer_topic(),
        }
    }
}

/// Worker pool tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConsumerSettings {
    /// Number of parallel workers (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upper bound for a single fetch call (default: 30)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Broker-side max wait for a fetch request (default: 10)
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    /// Sleep after a transient fetch error (default: 2)
    #[serde(default = "default_transient_backoff")]
    pub transient_backoff_secs: u64,
    /// Sleep after a failed dispatch before the message is fetched again (default: 5)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// Group heartbeat interval (default: 3)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
    /// How long close waits for in-flight cycles before aborting them (default: 30)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_wait() -> u64 {
    10
}

fn default_transient_backoff() -> u64 {
    2
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_heartbeat() -> u64 {
    3
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_wait_secs: default_max_wait(),
            transient_backoff_secs: default_transient_backoff(),
            retry_backoff_secs: default_retry_backoff(),
            heartbeat_interval_secs: default_heartbeat(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ConsumerSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn transient_backoff(&self) -> Duration {
        Duration::from_secs(self.transient_backoff_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthSettings {
    #[serde(default = "default_health_port")]
    pub port: u16,
}

fn default_health_port() -> u16 {
    8080
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            port: default_health_port(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LogSettings {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub kafka: KafkaSettings,
    #[serde(default)]
    pub consumer: ConsumerSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // COURIER_KAFKA__BROKERS=a:9092,b:9092 -> kafka.brokers
            .add_source(
                Environment::with_prefix("COURIER")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> Result<(), CourierError> {
        let brokers: Vec<&String> = self
            .kafka
            .brokers
            .iter()
            .filter(|b| !b.trim().is_empty())
            .collect();
        if brokers.is_empty() {
            return Err(CourierError::Config("no kafka brokers configured".into()));
        }
        if self.kafka.consumer_topic.trim().is_empty() {
            return Err(CourierError::Config("consumer topic is empty".into()));
        }
        if self.kafka.producer_topic.trim().is_empty() {
            return Err(CourierError::Config("producer topic is empty".into()));
        }
        if self.kafka.group_id.trim().is_empty() {
            return Err(CourierError::Config("consumer group id is empty".into()));
        }
        if self.consumer.workers == 0 {
            return Err(CourierError::Config("worker count must be at least 1".into()));
        }
        Ok(())
    }

    /// Brokers joined the way librdkafka expects `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> String {
        self.kafka
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}
