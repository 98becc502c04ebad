//! Dedicated thread pool for transaction signing.
//!
//! Signing is CPU-bound. Running it on tokio worker threads would delay the
//! network I/O of every sender sharing those workers, so signing jobs go to a
//! separate rayon pool and results come back over a oneshot channel.
//!
//! ```text
//!   tokio (I/O)                         rayon (CPU)
//!   ┌──────────────┐   spawn(job)    ┌────────────────┐
//!   │   Producer   │ ──────────────► │ signing-0..N-1 │
//!   │  .await rx   │ ◄────────────── │  signer.sign() │
//!   └──────────────┘  oneshot(result)└────────────────┘
//! ```

use crate::blockhash::Blockhash;
use crate::workloads::{SignError, SignedTransaction, TransactionSigner};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from the signing pool.
#[derive(Debug, Error)]
pub enum SigningPoolError {
    #[error("Failed to build rayon thread pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),

    #[error("Signing pool needs at least one thread")]
    NoThreads,

    #[error("Signing worker dropped the job")]
    WorkerGone,

    #[error(transparent)]
    Sign(#[from] SignError),
}

/// Pick a signing pool size from the available cores.
///
/// Leaves roughly a quarter of the machine (at least one core) to the tokio
/// runtime driving the senders.
pub fn default_signing_threads() -> usize {
    let available = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4);
    (available - available / 4).max(1)
}

/// Runs a [`TransactionSigner`] on a dedicated rayon pool.
pub struct SigningPool {
    pool: rayon::ThreadPool,
    signer: Arc<dyn TransactionSigner>,
    threads: usize,
    /// Jobs submitted but not yet finished.
    pending: Arc<AtomicUsize>,
}

impl SigningPool {
    /// Create a pool with `threads` signing threads.
    pub fn new(signer: Arc<dyn TransactionSigner>, threads: usize) -> Result<Self, SigningPoolError> {
        if threads == 0 {
            return Err(SigningPoolError::NoThreads);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("signing-{}", i))
            .build()?;

        tracing::info!(signing_threads = threads, "Signing pool initialized");

        Ok(Self {
            pool,
            signer,
            threads,
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of threads in the pool.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Current number of queued or running signing jobs.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Sign a transaction for `blockhash` on the pool and await the result.
    pub async fn sign(&self, blockhash: Blockhash) -> Result<SignedTransaction, SigningPoolError> {
        let (tx, rx) = oneshot::channel();
        let signer = self.signer.clone();
        let pending = self.pending.clone();

        pending.fetch_add(1, Ordering::Relaxed);
        self.pool.spawn(move || {
            let result = signer.sign(&blockhash);
            pending.fetch_sub(1, Ordering::Relaxed);
            // Receiver may have been dropped if the producer was cancelled.
            let _ = tx.send(result);
        });

        Ok(rx.await.map_err(|_| SigningPoolError::WorkerGone)??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;
    use crate::workloads::TransferWorkload;

    struct FailingSigner;

    impl TransactionSigner for FailingSigner {
        fn sign(&self, _blockhash: &Blockhash) -> Result<SignedTransaction, SignError> {
            Err(SignError::Signer("boom".into()))
        }
    }

    struct ThreadNameSigner;

    impl TransactionSigner for ThreadNameSigner {
        fn sign(&self, blockhash: &Blockhash) -> Result<SignedTransaction, SignError> {
            let name = std::thread::current().name().unwrap_or_default().to_string();
            Ok(SignedTransaction::new(name, [0u8; 64], *blockhash))
        }
    }

    #[test]
    fn test_default_signing_threads() {
        assert!(default_signing_threads() >= 1);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let signer = Arc::new(TransferWorkload::new(Keypair::from_seed(&[1u8; 32])));
        assert!(matches!(
            SigningPool::new(signer, 0),
            Err(SigningPoolError::NoThreads)
        ));
    }

    #[tokio::test]
    async fn test_sign_on_pool() {
        let workload = TransferWorkload::new(Keypair::from_seed(&[1u8; 32]));
        let blockhash = Blockhash::new([8u8; 32]);
        let expected = workload.sign(&blockhash).unwrap();

        let pool = SigningPool::new(Arc::new(workload), 2).unwrap();
        let tx = pool.sign(blockhash).await.unwrap();

        assert_eq!(tx.encoded(), expected.encoded());
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.threads(), 2);
    }

    #[tokio::test]
    async fn test_sign_runs_off_runtime() {
        let pool = SigningPool::new(Arc::new(ThreadNameSigner), 1).unwrap();
        let tx = pool.sign(Blockhash::new([0u8; 32])).await.unwrap();
        assert_eq!(tx.encoded(), "signing-0");
    }

    #[tokio::test]
    async fn test_sign_error_propagates() {
        let pool = SigningPool::new(Arc::new(FailingSigner), 1).unwrap();
        let result = pool.sign(Blockhash::new([0u8; 32])).await;
        assert!(matches!(result, Err(SigningPoolError::Sign(_))));
        assert_eq!(pool.pending(), 0);
    }
}
