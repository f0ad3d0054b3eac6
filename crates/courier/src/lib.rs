//! Notification orchestrator: consumes user events from Kafka, routes them to
//! per-event handlers and publishes notification requests back to Kafka.

pub mod config;
pub mod consumer;
pub mod error;
pub mod handlers;
pub mod health;
pub mod kafka;
pub mod logging;
pub mod processor;
pub mod publisher;
pub mod registry;
pub mod service;

// In-memory doubles (test builds or the `test-utils` feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{CourierError, Result};
