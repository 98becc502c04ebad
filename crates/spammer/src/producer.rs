//! Keeps the work queue topped up with transactions signed against the
//! current blockhash.

use crate::blockhash::{Blockhash, BlockhashCell};
use crate::queue::WorkQueue;
use crate::signing_pool::{SigningPool, SigningPoolError};
use crate::workloads::SignedTransaction;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Counters kept by the producer.
#[derive(Debug, Default)]
pub struct ProducerStats {
    signed: AtomicU64,
    sign_failures: AtomicU64,
    rotations: AtomicU64,
}

impl ProducerStats {
    /// Transactions signed and handed to the queue.
    pub fn signed(&self) -> u64 {
        self.signed.load(Ordering::Relaxed)
    }

    /// Signing attempts that failed and were dropped.
    pub fn sign_failures(&self) -> u64 {
        self.sign_failures.load(Ordering::Relaxed)
    }

    /// Times production switched to a new blockhash.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}

/// Drives the signing pool and feeds the queue.
///
/// Production targets one blockhash at a time. New signing jobs start only
/// while that blockhash is still current and while queued plus in-flight
/// transactions stay below the queue's soft limit. When the blockhash
/// rotates, jobs already started are still enqueued; submission decides
/// whether they were too old.
pub struct Producer {
    cell: Arc<BlockhashCell>,
    pool: Arc<SigningPool>,
    queue: WorkQueue,
    max_in_flight: usize,
    throttle_pause: Duration,
    stats: Arc<ProducerStats>,
}

impl Producer {
    pub fn new(
        cell: Arc<BlockhashCell>,
        pool: Arc<SigningPool>,
        queue: WorkQueue,
        max_in_flight: usize,
        throttle_pause: Duration,
    ) -> Self {
        Self {
            cell,
            pool,
            queue,
            max_in_flight: max_in_flight.max(1),
            throttle_pause,
            stats: Arc::new(ProducerStats::default()),
        }
    }

    /// Shared handle to this producer's counters.
    pub fn stats(&self) -> Arc<ProducerStats> {
        self.stats.clone()
    }

    /// Produce forever.
    pub async fn run(self) {
        info!(
            max_in_flight = self.max_in_flight,
            soft_limit = self.queue.soft_limit(),
            capacity = self.queue.capacity(),
            "Starting producer"
        );

        loop {
            let active = self.cell.wait_ready().await;
            self.produce_for(active).await;
            self.stats.rotations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sign against `active` until the stored blockhash changes.
    async fn produce_for(&self, active: Blockhash) {
        debug!(blockhash = %active, "Producing against blockhash");
        let mut in_flight = FuturesUnordered::new();

        while self.cell.current() == Some(active) {
            if in_flight.len() < self.max_in_flight && !self.queue.is_throttled(in_flight.len()) {
                in_flight.push(self.pool.sign(active));
                continue;
            }

            if in_flight.is_empty() {
                tokio::time::sleep(self.throttle_pause).await;
                continue;
            }

            if let Some(result) = in_flight.next().await {
                self.enqueue(result).await;
            }
        }

        // Already-signed work still goes out, even though it now carries an
        // older blockhash.
        while let Some(result) = in_flight.next().await {
            self.enqueue(result).await;
        }
    }

    async fn enqueue(&self, result: Result<SignedTransaction, SigningPoolError>) {
        match result {
            Ok(tx) => {
                self.stats.signed.fetch_add(1, Ordering::Relaxed);
                self.queue.push(tx).await;
            }
            Err(e) => {
                self.stats.sign_failures.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Signing failed, retrying");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workloads::{SignError, TransactionSigner};
    use std::sync::atomic::AtomicUsize;

    /// Cheap signer that tags each transaction with a sequence number.
    #[derive(Default)]
    struct SequenceSigner {
        calls: AtomicUsize,
        fail_every: Option<usize>,
    }

    impl TransactionSigner for SequenceSigner {
        fn sign(&self, blockhash: &Blockhash) -> Result<SignedTransaction, SignError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if let Some(every) = self.fail_every {
                if n % every == 0 {
                    return Err(SignError::Signer(format!("failure {n}")));
                }
            }
            Ok(SignedTransaction::new(n.to_string(), [0u8; 64], *blockhash))
        }
    }

    fn hash(byte: u8) -> Blockhash {
        Blockhash::new([byte; 32])
    }

    fn start(
        capacity: usize,
        threshold: f64,
        signer: SequenceSigner,
    ) -> (Arc<BlockhashCell>, WorkQueue, Arc<ProducerStats>, tokio::task::JoinHandle<()>) {
        let cell = Arc::new(BlockhashCell::new());
        let pool = Arc::new(SigningPool::new(Arc::new(signer), 2).unwrap());
        let queue = WorkQueue::new(capacity, threshold);
        let producer = Producer::new(
            cell.clone(),
            pool,
            queue.clone(),
            4,
            Duration::from_micros(500),
        );
        let stats = producer.stats();
        let handle = tokio::spawn(producer.run());
        (cell, queue, stats, handle)
    }

    async fn wait_for_len(queue: &WorkQueue, len: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while queue.len() < len {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("queue did not fill in time");
    }

    #[tokio::test]
    async fn test_waits_for_first_blockhash() {
        let (cell, queue, stats, handle) = start(10, 0.8, SequenceSigner::default());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty());
        assert_eq!(stats.signed(), 0);

        cell.publish(hash(1));
        wait_for_len(&queue, 8).await;
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_throttles_at_soft_limit() {
        let (cell, queue, stats, handle) = start(10, 0.8, SequenceSigner::default());
        cell.publish(hash(1));

        wait_for_len(&queue, 8).await;
        for _ in 0..50 {
            assert!(queue.len() <= 8, "queue grew past soft limit: {}", queue.len());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(queue.len(), 8);

        // Draining below the soft limit resumes production.
        for _ in 0..3 {
            queue.try_pop().unwrap();
        }
        wait_for_len(&queue, 8).await;
        assert_eq!(queue.len(), 8);
        assert_eq!(stats.signed(), 11);
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fractional_threshold_fills_to_first_depth_at_or_above() {
        // 10 * 0.85 = 8.5, so production continues at depth 8 and stops at 9.
        let (cell, queue, stats, handle) = start(10, 0.85, SequenceSigner::default());
        cell.publish(hash(1));

        wait_for_len(&queue, 9).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.len(), 9);
        assert_eq!(stats.signed(), 9);
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pauses_at_2400_of_3000() {
        let (cell, queue, _stats, handle) = start(3000, 0.8, SequenceSigner::default());
        assert_eq!(queue.soft_limit(), 2400);
        cell.publish(hash(1));

        wait_for_len(&queue, 2400).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.len(), 2400);

        queue.try_pop().unwrap();
        assert_eq!(queue.len(), 2399);
        wait_for_len(&queue, 2400).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.len(), 2400);
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_switches_to_new_blockhash() {
        let (cell, queue, stats, handle) = start(4, 1.0, SequenceSigner::default());
        cell.publish(hash(0xA));
        wait_for_len(&queue, 4).await;

        cell.publish(hash(0xB));

        let mut seen_new = false;
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let Some(tx) = queue.pop().await else { continue };
                if tx.blockhash() == hash(0xB) {
                    seen_new = true;
                } else {
                    assert!(!seen_new, "old blockhash enqueued after new one");
                }
                if seen_new && queue.len() == 4 {
                    break;
                }
            }
        })
        .await
        .expect("producer never switched blockhash");

        assert!(stats.rotations() >= 1);
        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sign_failures_are_retried() {
        let signer = SequenceSigner {
            fail_every: Some(3),
            ..Default::default()
        };
        let (cell, queue, stats, handle) = start(10, 1.0, signer);
        cell.publish(hash(1));

        wait_for_len(&queue, 10).await;
        assert!(stats.sign_failures() > 0);
        assert_eq!(stats.signed(), 10);
        handle.abort();
    }
}
