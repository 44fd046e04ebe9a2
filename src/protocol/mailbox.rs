//! Bounded inbound mailbox with priority ordering.
//!
//! Messages leave the mailbox by priority rank first and arrival order
//! second. A full mailbox drops new deliveries instead of blocking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::envelope::Message;

/// Default mailbox capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Heap entry ordered by (rank, sequence), never by payload.
#[derive(Debug)]
struct QueuedMessage {
    rank: u8,
    sequence: u64,
    message: Message,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.sequence == other.sequence
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the lowest rank, then the lowest
        // sequence, has to compare greatest.
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct MailboxState {
    heap: BinaryHeap<QueuedMessage>,
    next_sequence: u64,
    total_received: u64,
    total_dropped: u64,
}

/// Result of handing a message to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Dropped,
}

/// An agent's inbound mailbox.
#[derive(Debug)]
pub struct Mailbox {
    agent_id: String,
    capacity: usize,
    state: Mutex<MailboxState>,
    notify: Notify,
}

impl Mailbox {
    /// Create a mailbox; a capacity of zero is bumped to one.
    pub fn new(agent_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            capacity: capacity.max(1),
            state: Mutex::new(MailboxState::default()),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deliver a message. Never blocks.
    pub fn deliver(&self, message: Message) -> Delivery {
        let mut state = self.lock();

        if state.heap.len() >= self.capacity {
            state.total_dropped += 1;
            tracing::error!(
                agent_id = %self.agent_id,
                message_id = %message.id,
                capacity = self.capacity,
                "Mailbox full, dropping message"
            );
            return Delivery::Dropped;
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.total_received += 1;
        tracing::debug!(
            agent_id = %self.agent_id,
            "Received {} from {}",
            message.kind,
            message.sender_id
        );
        state.heap.push(QueuedMessage {
            rank: message.priority.rank(),
            sequence,
            message,
        });
        drop(state);

        self.notify.notify_one();
        Delivery::Queued
    }

    /// Take the next message if one is queued.
    pub fn try_next(&self) -> Option<Message> {
        self.lock().heap.pop().map(|entry| entry.message)
    }

    /// Wait until a message is available and take it.
    ///
    /// Cancel-safe: a message is only removed in the same poll that
    /// returns it.
    pub async fn next(&self) -> Message {
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.try_next() {
                return message;
            }
            notified.await;
        }
    }

    /// Discard everything queued; returns how many messages were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.heap.len();
        state.heap.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MailboxStats {
        let state = self.lock();
        MailboxStats {
            agent_id: self.agent_id.clone(),
            capacity: self.capacity,
            pending: state.heap.len(),
            total_received: state.total_received,
            total_dropped: state.total_dropped,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        // Every critical section leaves the heap consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mailbox statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxStats {
    pub agent_id: String,
    pub capacity: usize,
    pub pending: usize,
    pub total_received: u64,
    pub total_dropped: u64,
}
