//! Bounded handoff between the producer and the senders.

use crate::workloads::SignedTransaction;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Bounded multi-producer/multi-consumer queue of signed transactions.
///
/// Capacity is the hard bound: `push` waits while the queue is full, so the
/// depth can never exceed it. The soft limit is the depth at which the
/// producer stops signing, leaving headroom below the hard bound.
///
/// Consumers share the receiver behind an async mutex; items still come out
/// in the order they went in.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<SignedTransaction>,
    rx: Arc<Mutex<mpsc::Receiver<SignedTransaction>>>,
    soft_limit: usize,
}

impl WorkQueue {
    /// Create a queue of `capacity` slots whose soft limit is
    /// `ceil(capacity * soft_threshold)`, clamped to `[1, capacity]`. That is
    /// the first depth at which `depth >= capacity * soft_threshold` holds.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, soft_threshold: f64) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            soft_limit: soft_limit(capacity, soft_threshold),
        }
    }

    /// Maximum number of queued transactions.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Depth at which the producer throttles.
    pub fn soft_limit(&self) -> usize {
        self.soft_limit
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the depth plus `reserved` not-yet-enqueued items has
    /// reached the soft limit.
    pub fn is_throttled(&self, reserved: usize) -> bool {
        self.len() + reserved >= self.soft_limit
    }

    /// Enqueue, waiting for a free slot if the queue is full.
    pub async fn push(&self, tx: SignedTransaction) {
        // Every handle owns the receiver too, so the channel cannot be closed here.
        let _ = self.tx.send(tx).await;
    }

    /// Dequeue, waiting while the queue is empty.
    pub async fn pop(&self) -> Option<SignedTransaction> {
        self.rx.lock().await.recv().await
    }

    /// Dequeue without waiting for an item. Returns `None` if the queue is
    /// empty or another consumer currently holds the receiver.
    pub fn try_pop(&self) -> Option<SignedTransaction> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

fn soft_limit(capacity: usize, fraction: f64) -> usize {
    ((capacity as f64 * fraction).ceil() as usize).clamp(1, capacity.max(1))
}
