//! Worker pool consuming inbound events with manual offset control.
//!
//! Every worker loops fetch → decode → dispatch → commit against one shared
//! [`MessageSource`]:
//!
//! - transient fetch errors back off briefly and retry without committing;
//! - envelopes that do not parse are committed and skipped, never retried;
//! - a failed dispatch is left uncommitted, rewound, and fetched again after a
//!   pause, with no attempt limit;
//! - a commit failure after a successful dispatch is only logged, so the
//!   message may be delivered again (at-least-once).

mod source;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use courier_protocol::InboundEvent;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use source::{CommitError, FetchClass, FetchError, MessageSource, SourceMessage};

use crate::config::ConsumerSettings;
use crate::processor::Processor;

/// Timing knobs of the worker loop.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    /// Upper bound for one fetch call
    pub fetch_timeout: Duration,
    /// Pause after a transient fetch error
    pub transient_backoff: Duration,
    /// Pause after a failed dispatch
    pub retry_backoff: Duration,
    /// Upper bound for [`Consumer::close`] to wait on in-flight cycles
    pub shutdown_timeout: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self::from(&ConsumerSettings::default())
    }
}

impl From<&ConsumerSettings> for ConsumerOptions {
    fn from(settings: &ConsumerSettings) -> Self {
        Self {
            fetch_timeout: settings.fetch_timeout(),
            transient_backoff: settings.transient_backoff(),
            retry_backoff: settings.retry_backoff(),
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer already closed")]
    AlreadyClosed,

    #[error("failed to close message source: {0}")]
    Source(#[from] FetchError),
}

/// Result of one fetch-process-commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Dispatched successfully; commit attempted.
    Processed,
    /// Envelope did not parse; committed and dropped.
    Skipped,
    /// Dispatch failed; left uncommitted for another attempt.
    Retry,
    /// Transient fetch error.
    Transient,
    /// Fetch cancelled or deadline passed.
    Idle,
    /// Any other fetch failure.
    FetchFailed,
}

struct Shared {
    source: Arc<dyn MessageSource>,
    processor: Arc<Processor>,
    options: ConsumerOptions,
    shutdown: CancellationToken,
}

/// Event Consumer
///
/// Owns N workers sharing one message source. Workers stop when the token
/// passed to [`Consumer::start`] is cancelled or [`Consumer::close`] is called;
/// either way the cycle in flight runs to completion first.
pub struct Consumer {
    shared: Arc<Shared>,
    closed: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Consumer {
    pub fn new(
        source: Arc<dyn MessageSource>,
        processor: Arc<Processor>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                processor,
                options,
                shutdown: CancellationToken::new(),
            }),
            closed: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `workers` independent worker tasks.
    pub async fn start(&self, cancel: CancellationToken, workers: usize) {
        if self.closed.load(Ordering::SeqCst) {
            warn!("consumer is closed, not starting workers");
            return;
        }

        let mut handles = self.workers.lock().await;
        let first_id = handles.len();
        for worker_id in first_id..first_id + workers {
            let shared = self.shared.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                shared.worker(worker_id, cancel).await;
            }));
        }

        info!(workers, "consumer started");
    }

    /// Run a single fetch-process-commit cycle on the caller's task.
    pub async fn run_cycle(&self, worker_id: usize, cancel: &CancellationToken) -> CycleOutcome {
        self.shared.run_cycle(worker_id, cancel).await
    }

    /// Number of worker tasks spawned and not yet reaped by [`Consumer::close`].
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Signal every worker, wait for them to finish their current cycle, then
    /// close the source.
    ///
    /// Workers still busy after `shutdown_timeout` are aborted; their messages
    /// stay uncommitted and are delivered again to the next group member.
    ///
    /// Only the first call does anything; later calls return
    /// [`ConsumerError::AlreadyClosed`].
    pub async fn close(&self) -> Result<(), ConsumerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ConsumerError::AlreadyClosed);
        }

        info!("closing consumer");
        self.shared.shutdown.cancel();

        let mut handles = std::mem::take(&mut *self.workers.lock().await);
        let timeout = self.shared.options.shutdown_timeout;
        let joined = tokio::time::timeout(timeout, join_all(handles.iter_mut())).await;
        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "consumer worker ended abnormally");
                    }
                }
            }
            Err(_) => {
                let stuck = handles.iter().filter(|h| !h.is_finished()).count();
                warn!(stuck, timeout_secs = timeout.as_secs_f64(), "workers did not stop in time, aborting");
                for handle in &handles {
                    handle.abort();
                }
            }
        }

        self.shared.source.close().await?;
        info!("consumer closed");
        Ok(())
    }
}

impl Shared {
    async fn worker(&self, worker_id: usize, cancel: CancellationToken) {
        info!(worker_id, "consumer worker started");

        loop {
            if cancel.is_cancelled() {
                info!(worker_id, "worker stopping: context cancelled");
                return;
            }
            if self.shutdown.is_cancelled() {
                info!(worker_id, "worker stopping: shutdown signal");
                return;
            }

            let pause = match self.run_cycle(worker_id, &cancel).await {
                CycleOutcome::Transient => self.options.transient_backoff,
                CycleOutcome::Retry => self.options.retry_backoff,
                _ => continue,
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
    }

    async fn run_cycle(&self, worker_id: usize, cancel: &CancellationToken) -> CycleOutcome {
        let message = match self.fetch(cancel).await {
            Ok(message) => message,
            Err(e) => {
                return match e.class() {
                    FetchClass::Transient => {
                        warn!(worker_id, error = %e, "transient fetch error, will retry");
                        CycleOutcome::Transient
                    }
                    FetchClass::Cancelled => {
                        debug!(worker_id, reason = %e, "fetch ended without a message");
                        CycleOutcome::Idle
                    }
                    FetchClass::Other => {
                        error!(worker_id, error = %e, "failed to fetch message");
                        CycleOutcome::FetchFailed
                    }
                };
            }
        };

        let event: InboundEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    worker_id,
                    error = %e,
                    position = %message.position(),
                    raw = %String::from_utf8_lossy(&message.payload),
                    "invalid event JSON, skipping"
                );
                if let Err(e) = self.source.commit(&message).await {
                    error!(worker_id, error = %e, "failed to commit invalid message");
                }
                return CycleOutcome::Skipped;
            }
        };

        info!(
            worker_id,
            event_type = %event.kind,
            event_id = %event.id,
            position = %message.position(),
            "processing event"
        );

        if let Err(e) = self.processor.process(&event).await {
            error!(
                worker_id,
                error = %e,
                event_type = %event.kind,
                event_id = %event.id,
                retry_in_secs = self.options.retry_backoff.as_secs_f64(),
                "failed to process event, leaving it uncommitted"
            );
            if let Err(e) = self.source.rewind(&message).await {
                error!(worker_id, error = %e, position = %message.position(), "failed to rewind source");
            }
            return CycleOutcome::Retry;
        }

        match self.source.commit(&message).await {
            Ok(()) => info!(worker_id, event_id = %event.id, "message committed"),
            Err(e) => error!(worker_id, error = %e, event_id = %event.id, "failed to commit message"),
        }
        CycleOutcome::Processed
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<SourceMessage, FetchError> {
        let timeout = self.options.fetch_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = self.shutdown.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(timeout, self.source.fetch()) => match result {
                Ok(fetched) => fetched,
                Err(_) => Err(FetchError::TimedOut(timeout)),
            },
        }
    }
}
