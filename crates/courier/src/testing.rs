//! In-process doubles for the Kafka source, the Kafka sink, the notification
//! service and event handlers. Used by unit tests and by the integration tests
//! under `tests/`.

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use courier_protocol::{Channel, InboundEvent, NotificationEvent, UserData};
use tokio::sync::{Notify, Semaphore};

use crate::consumer::{CommitError, FetchError, MessageSource, SourceMessage};
use crate::handlers::HandlerError;
use crate::publisher::{MessageSink, PublishError};
use crate::registry::EventHandler;
use crate::service::{NotificationService, ServiceError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Take one unit from a countdown, returning whether one was available.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Partition {
    log: Vec<SourceMessage>,
    cursor: usize,
    leased: bool,
    committed: Option<i64>,
}

#[derive(Default)]
struct SourceState {
    partitions: Vec<Partition>,
    next_partition: usize,
    fetch_errors: Vec<FetchError>,
    commit_failures: usize,
    commits: Vec<(i32, i64)>,
    rewinds: Vec<(i32, i64)>,
    fetched: usize,
    closed: bool,
}

impl SourceState {
    fn next_message(&mut self) -> Option<SourceMessage> {
        let count = self.partitions.len();
        for step in 0..count {
            let index = (self.next_partition + step) % count;
            let partition = &mut self.partitions[index];
            if partition.leased || partition.cursor >= partition.log.len() {
                continue;
            }

            let message = partition.log[partition.cursor].clone();
            partition.cursor += 1;
            partition.leased = true;
            self.next_partition = (index + 1) % count;
            self.fetched += 1;
            return Some(message);
        }
        None
    }

    fn partition_mut(&mut self, partition: i32) -> Option<&mut Partition> {
        usize::try_from(partition)
            .ok()
            .and_then(|index| self.partitions.get_mut(index))
    }
}

/// Partitioned in-memory log behaving like one member of a consumer group.
///
/// A partition is leased to the worker that fetched from it until that worker
/// commits or rewinds, so two workers never hold messages of the same
/// partition at once, which is stricter than [`MessageSource`] requires. An
/// empty source blocks in `fetch` until a message is pushed or the source is
/// closed.
pub struct InMemorySource {
    topic: String,
    state: Mutex<SourceState>,
    changed: Notify,
}

impl InMemorySource {
    pub fn new(topic: impl Into<String>, partitions: usize) -> Self {
        let state = SourceState {
            partitions: (0..partitions.max(1)).map(|_| Partition::default()).collect(),
            ..SourceState::default()
        };
        Self {
            topic: topic.into(),
            state: Mutex::new(state),
            changed: Notify::new(),
        }
    }

    /// Append a raw payload to `partition`, returning its offset.
    pub fn push(&self, partition: i32, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = lock(&self.state);
            let Some(log) = state.partition_mut(partition).map(|p| &mut p.log) else {
                return -1;
            };
            let offset = log.len() as i64;
            log.push(SourceMessage {
                topic: self.topic.clone(),
                partition,
                offset,
                key: None,
                payload: payload.into(),
            });
            offset
        };
        self.changed.notify_waiters();
        offset
    }

    /// Append a JSON encoded event to `partition`, returning its offset.
    pub fn push_event(&self, partition: i32, event: &InboundEvent) -> i64 {
        match serde_json::to_vec(event) {
            Ok(payload) => self.push(partition, payload),
            Err(_) => -1,
        }
    }

    /// Make the next fetch fail with `error` instead of returning a message.
    pub fn fail_next_fetch(&self, error: FetchError) {
        lock(&self.state).fetch_errors.push(error);
        self.changed.notify_waiters();
    }

    /// Make the next `n` commits fail.
    pub fn fail_next_commits(&self, n: usize) {
        lock(&self.state).commit_failures = n;
    }

    /// Successful commits as `(partition, offset)`, in commit order.
    pub fn commits(&self) -> Vec<(i32, i64)> {
        lock(&self.state).commits.clone()
    }

    /// Rewinds as `(partition, offset)`, in order.
    pub fn rewinds(&self) -> Vec<(i32, i64)> {
        lock(&self.state).rewinds.clone()
    }

    /// Offset of the last committed message on `partition`.
    pub fn committed(&self, partition: i32) -> Option<i64> {
        lock(&self.state)
            .partition_mut(partition)
            .and_then(|p| p.committed)
    }

    /// Number of messages handed out so far, re-deliveries included.
    pub fn fetched(&self) -> usize {
        lock(&self.state).fetched
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Poll until at least `n` commits happened or `timeout` passes.
    pub async fn wait_for_commits(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.commits().len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.commits().len() >= n
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn fetch(&self) -> Result<SourceMessage, FetchError> {
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();

            {
                let mut state = lock(&self.state);
                if state.closed {
                    return Err(FetchError::Cancelled);
                }
                if !state.fetch_errors.is_empty() {
                    return Err(state.fetch_errors.remove(0));
                }
                if let Some(message) = state.next_message() {
                    return Ok(message);
                }
            }

            notified.await;
        }
    }

    async fn commit(&self, message: &SourceMessage) -> Result<(), CommitError> {
        let result = {
            let mut state = lock(&self.state);
            let fail = state.commit_failures > 0;
            if fail {
                state.commit_failures -= 1;
            }

            match state.partition_mut(message.partition) {
                None => Err(CommitError::new(message, "unknown partition")),
                Some(partition) => {
                    partition.leased = false;
                    if fail {
                        Err(CommitError::new(message, "scripted commit failure"))
                    } else {
                        partition.committed = Some(message.offset);
                        state.commits.push((message.partition, message.offset));
                        Ok(())
                    }
                }
            }
        };
        self.changed.notify_waiters();
        result
    }

    async fn rewind(&self, message: &SourceMessage) -> Result<(), FetchError> {
        let result = {
            let mut state = lock(&self.state);
            match state.partition_mut(message.partition) {
                None => Err(FetchError::Other(format!(
                    "unknown partition {}",
                    message.partition
                ))),
                Some(partition) => {
                    partition.cursor = usize::try_from(message.offset).unwrap_or(0);
                    partition.leased = false;
                    state.rewinds.push((message.partition, message.offset));
                    Ok(())
                }
            }
        };
        self.changed.notify_waiters();
        result
    }

    async fn close(&self) -> Result<(), FetchError> {
        lock(&self.state).closed = true;
        self.changed.notify_waiters();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// One message as handed to a [`MessageSink`].
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Sink keeping every sent message in memory.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SentRecord>>,
    failures: AtomicUsize,
    flushes: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends. Failed sends are not recorded.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<SentRecord> {
        lock(&self.records).clone()
    }

    /// Sent payloads decoded as notification requests.
    pub fn events(&self) -> Vec<NotificationEvent> {
        lock(&self.records)
            .iter()
            .filter_map(|r| serde_json::from_slice(&r.payload).ok())
            .collect()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), PublishError> {
        if take_one(&self.failures) {
            return Err(PublishError::Send("broker rejected the message".to_string()));
        }

        lock(&self.records).push(SentRecord {
            key: key.to_vec(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn flush(&self) -> Result<(), PublishError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    UserRegistered {
        user_id: i64,
        url: String,
    },
    Notification {
        user_id: i64,
        channel: Channel,
        template: String,
    },
    OtpRecovery {
        user_id: i64,
        url: String,
    },
    UserVerified {
        user_id: i64,
    },
}

/// Notification service that records calls instead of publishing.
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<ServiceCall>>,
    failing: Mutex<Vec<Channel>>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `send_notification` fail for `channel`. The failing call is still recorded.
    pub fn fail_on(&self, channel: Channel) {
        lock(&self.failing).push(channel);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: ServiceCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl NotificationService for RecordingService {
    async fn on_user_registered(&self, user: &UserData, url: &str) -> Result<(), ServiceError> {
        self.record(ServiceCall::UserRegistered {
            user_id: user.id,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn send_notification(
        &self,
        user: &UserData,
        channel: Channel,
        template: &str,
    ) -> Result<(), ServiceError> {
        self.record(ServiceCall::Notification {
            user_id: user.id,
            channel,
            template: template.to_string(),
        });

        if lock(&self.failing).contains(&channel) {
            return Err(PublishError::Send(format!("{channel} delivery unavailable")).into());
        }
        Ok(())
    }

    async fn send_otp_recovery(&self, user: &UserData, url: &str) -> Result<(), ServiceError> {
        self.record(ServiceCall::OtpRecovery {
            user_id: user.id,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn on_user_verified(&self, user: &UserData) -> Result<(), ServiceError> {
        self.record(ServiceCall::UserVerified { user_id: user.id });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handler with a fixed outcome that counts its invocations.
pub struct ScriptedHandler {
    kinds: &'static [&'static str],
    failures_left: AtomicUsize,
    invocations: AtomicUsize,
}

impl ScriptedHandler {
    pub fn ok(kinds: &'static [&'static str]) -> Self {
        Self::failing_times(kinds, 0)
    }

    pub fn failing(kinds: &'static [&'static str]) -> Self {
        Self::failing_times(kinds, usize::MAX)
    }

    /// Fail the first `n` invocations, then succeed.
    pub fn failing_times(kinds: &'static [&'static str], n: usize) -> Self {
        Self {
            kinds,
            failures_left: AtomicUsize::new(n),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for ScriptedHandler {
    fn event_types(&self) -> &[&'static str] {
        self.kinds
    }

    async fn handle(&self, _event: &InboundEvent) -> Result<(), HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failures_left) {
            return Err(HandlerError::decode(
                "SCRIPTED",
                <serde_json::Error as serde::de::Error>::custom("scripted handler failure"),
            ));
        }
        Ok(())
    }
}

/// Handler whose dispatch never finishes.
pub struct StallingHandler {
    kinds: &'static [&'static str],
    entered: Semaphore,
}

impl StallingHandler {
    pub fn new(kinds: &'static [&'static str]) -> Self {
        Self {
            kinds,
            entered: Semaphore::new(0),
        }
    }

    /// Wait until some worker is stuck inside `handle`.
    pub async fn entered(&self) {
        if let Ok(permit) = self.entered.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl EventHandler for StallingHandler {
    fn event_types(&self) -> &[&'static str] {
        self.kinds
    }

    async fn handle(&self, _event: &InboundEvent) -> Result<(), HandlerError> {
        self.entered.add_permits(1);
        std::future::pending::<()>().await;
        Ok(())
    }
}
