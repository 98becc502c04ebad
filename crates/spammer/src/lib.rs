//! Blockhash-aware transaction spammer.
//!
//! Keeps one or more JSON-RPC endpoints saturated with freshly signed
//! transfers. Every transaction embeds a recent blockhash, which rotates, so
//! the pipeline tracks it continuously and re-targets production whenever it
//! changes.
//!
//! ```text
//!  BlockhashTracker ──► BlockhashCell ──► Producer ──► SigningPool (rayon)
//!                                             │
//!                                             ▼
//!                                         WorkQueue (bounded)
//!                                             │
//!                                             ▼
//!                        SenderPool (N tokio tasks, round-robin endpoints)
//!                                             │
//!                                             ▼
//!                         SpammerStats ──► StatsReporter (stdout)
//! ```
//!
//! Signing is CPU-bound and runs on a dedicated rayon pool so it never stalls
//! the tokio workers driving network I/O. The queue capacity is the only
//! backpressure between production and submission.

pub mod blockhash;
pub mod client;
pub mod config;
pub mod keypair;
pub mod producer;
pub mod queue;
pub mod runner;
pub mod sender;
pub mod signing_pool;
pub mod stats;
pub mod workloads;

pub use blockhash::{Blockhash, BlockhashCell, BlockhashTracker};
pub use client::{wait_until_healthy, RpcClient, RpcError, SubmitResponse};
pub use config::{ConfigError, FileConfig, SpammerConfig};
pub use keypair::{Keypair, KeypairError};
pub use producer::{Producer, ProducerStats};
pub use queue::WorkQueue;
pub use runner::{cancel_on_shutdown, Spammer, SpammerError, SpammerReport};
pub use sender::{assign_endpoints, classify, SenderPool, StaleMatcher, SubmitOutcome};
pub use signing_pool::{SigningPool, SigningPoolError};
pub use stats::{SpammerStats, StatsReporter, StatsSnapshot, ThroughputSampler};
pub use workloads::{SignError, SignedTransaction, TransactionSigner, TransferWorkload};
