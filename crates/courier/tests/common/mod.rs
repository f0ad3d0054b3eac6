#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use courier::consumer::{Consumer, ConsumerOptions};
use courier::handlers::register_defaults;
use courier::processor::Processor;
use courier::publisher::Publisher;
use courier::registry::HandlerRegistry;
use courier::service::UserNotificationService;
use courier::testing::{InMemorySource, RecordingSink};

pub const WAIT: Duration = Duration::from_secs(5);

/// Full pipeline wired to in-memory Kafka doubles.
pub struct Harness {
    pub source: Arc<InMemorySource>,
    pub sink: Arc<RecordingSink>,
    pub consumer: Consumer,
}

pub fn harness(partitions: usize) -> Harness {
    let source = Arc::new(InMemorySource::new("user-events", partitions));
    let sink = Arc::new(RecordingSink::new());

    let publisher = Arc::new(Publisher::new(sink.clone()));
    let service = Arc::new(UserNotificationService::new(publisher));
    let mut registry = HandlerRegistry::new();
    register_defaults(&mut registry, service);

    let processor = Arc::new(Processor::new(Arc::new(registry)));
    let consumer = Consumer::new(
        source.clone(),
        processor,
        ConsumerOptions {
            fetch_timeout: Duration::from_millis(100),
            transient_backoff: Duration::from_millis(10),
            retry_backoff: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(1),
        },
    );

    Harness {
        source,
        sink,
        consumer,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
