//! Bounded in-process queue of pending origin writes
//!
//! The queue is an explicit value handed to [`crate::write::WriteBehind`], so
//! tests construct isolated queues and inspect them directly. It is not
//! durable: entries still queued when the process dies are lost.

use crate::error::{CacheError, Result};
use crate::write::WriteFn;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Lifecycle of a pending write
///
/// `Queued -> Flushing -> {Committed | RequeuedWithBackoff | DroppedFailed}`;
/// a requeued write goes back to `Flushing` once its backoff elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWriteState {
    Queued,
    Flushing,
    Committed,
    RequeuedWithBackoff,
    DroppedFailed,
}

impl PendingWriteState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PendingWriteState::Committed | PendingWriteState::DroppedFailed
        )
    }
}

/// One deferred origin write
pub struct PendingWrite {
    /// Enqueue order; writes of the same key are applied in this order
    pub id: u64,
    pub key: String,
    pub value: Vec<u8>,
    pub(crate) write_fn: WriteFn,
    /// Failed attempts so far
    pub retries: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest moment of the next attempt after a failure
    pub not_before: Option<Instant>,
    pub state: PendingWriteState,
}

impl PendingWrite {
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |t| t <= now)
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("value_len", &self.value.len())
            .field("retries", &self.retries)
            .field("enqueued_at", &self.enqueued_at)
            .field("state", &self.state)
            .finish()
    }
}

struct QueueState {
    /// Waiting writes, ordered by id
    items: VecDeque<PendingWrite>,
    /// Writes taken by a flush and not yet settled
    in_flight: usize,
    next_id: u64,
}

/// Bounded FIFO of [`PendingWrite`]s
pub struct WriteQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl WriteQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                in_flight: 0,
                next_id: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waiting plus in-flight writes
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.items.len() + state.in_flight
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_full(&self) -> bool {
        self.len().await >= self.capacity
    }

    /// Enqueue a write, failing with `QueueFull` at capacity
    pub async fn push(&self, key: &str, value: Vec<u8>, write_fn: WriteFn) -> Result<u64> {
        let mut state = self.state.lock().await;
        if state.items.len() + state.in_flight >= self.capacity {
            return Err(CacheError::QueueFull {
                capacity: self.capacity,
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.items.push_back(PendingWrite {
            id,
            key: key.to_string(),
            value,
            write_fn,
            retries: 0,
            enqueued_at: Utc::now(),
            not_before: None,
            state: PendingWriteState::Queued,
        });
        Ok(id)
    }

    /// Keys and states of waiting writes, in order
    pub async fn snapshot(&self) -> Vec<(String, u32, PendingWriteState)> {
        let state = self.state.lock().await;
        state
            .items
            .iter()
            .map(|w| (w.key.clone(), w.retries, w.state))
            .collect()
    }

    /// Take every waiting write for flushing
    pub(crate) async fn take_all(&self) -> Vec<PendingWrite> {
        let mut state = self.state.lock().await;
        let taken: Vec<PendingWrite> = state.items.drain(..).collect();
        state.in_flight += taken.len();
        taken
    }

    /// Finish a flush of `taken` writes, putting `returned` back in id order
    pub(crate) async fn settle(&self, taken: usize, returned: Vec<PendingWrite>) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(taken);
        state.items.extend(returned);
        state.items.make_contiguous().sort_by_key(|w| w.id);
    }

    /// When the next flush can make progress
    ///
    /// Only the oldest write of each key counts: later writes of that key wait
    /// behind it whatever their own deadline. `None` when nothing is waiting.
    pub(crate) async fn next_due(&self) -> Option<Instant> {
        let state = self.state.lock().await;
        let now = Instant::now();
        let mut seen = HashSet::new();

        state
            .items
            .iter()
            .filter(|w| seen.insert(w.key.as_str()))
            .map(|w| w.not_before.unwrap_or(now))
            .min()
    }
}
