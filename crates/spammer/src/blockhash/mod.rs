//! Recent-blockhash tracking.
//!
//! A transaction is only accepted while the blockhash it embeds is recent, so
//! the spammer keeps a single shared [`BlockhashCell`] that one
//! [`BlockhashTracker`] refreshes and everyone else reads.

use crate::client::{RpcClient, RpcError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// A 32-byte recent blockhash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blockhash([u8; 32]);

impl Blockhash {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({})", self)
    }
}

impl FromStr for Blockhash {
    type Err = BlockhashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec()?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| BlockhashParseError::InvalidLength(v.len()))?;
        Ok(Self(array))
    }
}

/// Errors parsing a base58 blockhash.
#[derive(Debug, thiserror::Error)]
pub enum BlockhashParseError {
    #[error("Invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("Blockhash must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Shared slot holding the current blockhash.
///
/// Starts empty and is filled by the first successful poll. Writes replace
/// the whole value; readers always see either `None` (before the first
/// publish) or a complete published blockhash.
pub struct BlockhashCell {
    tx: watch::Sender<Option<Blockhash>>,
    updates: AtomicU64,
}

impl Default for BlockhashCell {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockhashCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            updates: AtomicU64::new(0),
        }
    }

    /// Current blockhash, or `None` if none has been published yet.
    pub fn current(&self) -> Option<Blockhash> {
        *self.tx.borrow()
    }

    /// Publish `hash`. Returns `true` if it differs from the stored value.
    pub fn publish(&self, hash: Blockhash) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == Some(hash) {
                false
            } else {
                *current = Some(hash);
                true
            }
        });
        if changed {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
        changed
    }

    /// Number of times the stored value actually changed.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Subscribe to changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Blockhash>> {
        self.tx.subscribe()
    }

    /// Wait until a blockhash is available and return it.
    pub async fn wait_ready(&self) -> Blockhash {
        let mut rx = self.subscribe();
        loop {
            if let Some(hash) = *rx.borrow_and_update() {
                return hash;
            }
            // The sender lives in `self`, so the channel stays open while we hold `&self`.
            let _ = rx.changed().await;
        }
    }
}

/// Periodically refreshes a [`BlockhashCell`] from randomly chosen endpoints.
///
/// Poll failures are logged and otherwise ignored; the cell keeps the last
/// good value.
pub struct BlockhashTracker {
    clients: Vec<RpcClient>,
    cell: Arc<BlockhashCell>,
    poll_interval: Duration,
    rng: ChaCha8Rng,
}

impl BlockhashTracker {
    /// Create a tracker. `clients` must not be empty.
    pub fn new(clients: Vec<RpcClient>, cell: Arc<BlockhashCell>, poll_interval: Duration) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        Self {
            clients,
            cell,
            poll_interval,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Poll one random endpoint once. Returns whether the cell changed.
    pub async fn poll_once(&mut self) -> Result<bool, RpcError> {
        let idx = self.rng.gen_range(0..self.clients.len());
        let client = &self.clients[idx];
        let hash = client.get_latest_blockhash().await?;

        let changed = self.cell.publish(hash);
        if changed {
            debug!(blockhash = %hash, endpoint = client.base_url(), "Blockhash updated");
        }
        Ok(changed)
    }

    /// Poll forever.
    pub async fn run(mut self) {
        info!(
            endpoints = self.clients.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting blockhash tracker"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                debug!(error = %e, "Blockhash poll failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
