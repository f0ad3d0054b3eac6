use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use courier::config::Settings;
use courier::consumer::{Consumer, ConsumerOptions};
use courier::handlers::register_defaults;
use courier::kafka::{self, KafkaSink, KafkaSource};
use courier::processor::Processor;
use courier::publisher::Publisher;
use courier::registry::HandlerRegistry;
use courier::service::UserNotificationService;
use courier::{health, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let started = Instant::now();

    let settings = Settings::new().context("failed to load configuration")?;
    logging::init(settings.log.format);
    settings.validate().context("invalid configuration")?;

    info!(
        brokers = %settings.bootstrap_servers(),
        consumer_topic = %settings.kafka.consumer_topic,
        group_id = %settings.kafka.group_id,
        producer_topic = %settings.kafka.producer_topic,
        workers = settings.consumer.workers,
        health_port = settings.health.port,
        "configuration loaded"
    );

    kafka::check_connectivity(&settings)
        .await
        .context("kafka is not reachable")?;

    let publisher = Arc::new(Publisher::new(Arc::new(KafkaSink::new(&settings)?)));
    let service = Arc::new(UserNotificationService::new(publisher.clone()));

    let mut registry = HandlerRegistry::new();
    register_defaults(&mut registry, service);
    info!(event_types = ?registry.kinds(), "handlers registered");

    let processor = Arc::new(Processor::new(Arc::new(registry)));
    let source = Arc::new(KafkaSource::new(&settings)?);
    let consumer = Consumer::new(
        source,
        processor,
        ConsumerOptions::from(&settings.consumer),
    );

    let cancel = CancellationToken::new();

    let health_port = settings.health.port;
    let health_cancel = cancel.clone();
    let health_task = tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, started, health_cancel).await {
            error!(error = %e, "health server failed");
        }
    });

    consumer.start(cancel.clone(), settings.consumer.workers).await;
    info!("courier running, waiting for shutdown signal");

    shutdown_signal().await;
    info!("shutdown signal received");

    cancel.cancel();
    if let Err(e) = consumer.close().await {
        error!(error = %e, "failed to close consumer");
    }
    if let Err(e) = publisher.flush().await {
        warn!(error = %e, "failed to flush pending notifications");
    }
    if let Err(e) = health_task.await {
        error!(error = %e, "health server task failed");
    }

    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
