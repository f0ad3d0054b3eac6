//! Bookkeeping that keeps commits behind every unfinished offset.
//!
//! Workers share one `StreamConsumer`, so consecutive offsets of a partition
//! can be in flight on different workers at once. A partition's commit
//! position only ever moves up to its lowest offset that is still in flight.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tokio::time::Instant;

use crate::consumer::SourceMessage;

#[derive(Debug, Default)]
struct PartitionOffsets {
    in_flight: BTreeSet<i64>,
    max_done: Option<i64>,
    committed: Option<i64>,
}

/// In-flight offsets per `(topic, partition)`.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionOffsets>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message was handed to a worker.
    pub fn begin(&mut self, topic: &str, partition: i32, offset: i64) {
        self.partitions
            .entry((topic.to_string(), partition))
            .or_default()
            .in_flight
            .insert(offset);
    }

    /// A message is done. Returns the next offset to commit, if it moved.
    pub fn complete(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self
            .partitions
            .entry((topic.to_string(), partition))
            .or_default();

        state.in_flight.remove(&offset);
        state.max_done = Some(state.max_done.map_or(offset, |done| done.max(offset)));

        let next = match state.in_flight.first() {
            Some(&lowest) => lowest,
            None => state.max_done? + 1,
        };

        match state.committed {
            Some(committed) if next <= committed => None,
            _ => Some(next),
        }
    }

    /// Record a successful commit of `next`.
    pub fn committed(&mut self, topic: &str, partition: i32, next: i64) {
        let state = self
            .partitions
            .entry((topic.to_string(), partition))
            .or_default();
        state.committed = Some(state.committed.map_or(next, |c| c.max(next)));
    }

    pub fn in_flight(&self, topic: &str, partition: i32) -> usize {
        self.partitions
            .get(&(topic.to_string(), partition))
            .map_or(0, |state| state.in_flight.len())
    }
}

/// Failed messages waiting to be fetched again, each after its own due time.
#[derive(Debug, Default)]
pub struct RedeliveryQueue {
    pending: VecDeque<(Instant, SourceMessage)>,
}

impl RedeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due: Instant, message: SourceMessage) {
        self.pending.push_back((due, message));
    }

    /// Remove and return the first message due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<SourceMessage> {
        let index = self.pending.iter().position(|(due, _)| *due <= now)?;
        self.pending.remove(index).map(|(_, message)| message)
    }

    /// Earliest due time among waiting messages.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|(due, _)| *due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
