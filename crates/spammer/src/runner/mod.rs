//! Spammer runner that wires the pipeline together and drives a run.

use crate::blockhash::{BlockhashCell, BlockhashTracker};
use crate::client::{wait_until_healthy, RpcClient};
use crate::config::SpammerConfig;
use crate::producer::Producer;
use crate::queue::WorkQueue;
use crate::sender::{SenderPool, StaleMatcher};
use crate::signing_pool::{SigningPool, SigningPoolError};
use crate::stats::{format_progress, SpammerStats, StatsReporter};
use crate::workloads::TransactionSigner;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Transaction spammer that submits to real network endpoints.
pub struct Spammer {
    config: SpammerConfig,
    clients: Vec<RpcClient>,
    cell: Arc<BlockhashCell>,
    queue: WorkQueue,
    pool: Arc<SigningPool>,
    stats: Arc<SpammerStats>,
    matcher: Arc<StaleMatcher>,
}

impl Spammer {
    /// Create a new spammer with the given configuration and signer.
    pub fn new(
        config: SpammerConfig,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, SpammerError> {
        config.validate()?;

        // One connection pool shared by every endpoint client.
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.num_senders)
            .build()
            .map_err(SpammerError::HttpClient)?;

        let clients: Vec<RpcClient> = config
            .rpc_endpoints
            .iter()
            .map(|url| RpcClient::new(url.clone(), http.clone(), config.request_timeout))
            .collect();

        let pool = SigningPool::new(signer, config.signing_threads)?;
        let queue = WorkQueue::new(config.queue_capacity, config.soft_threshold);
        let matcher = StaleMatcher::new(&config.stale_markers);

        Ok(Self {
            clients,
            cell: Arc::new(BlockhashCell::new()),
            queue,
            pool: Arc::new(pool),
            stats: Arc::new(SpammerStats::default()),
            matcher: Arc::new(matcher),
            config,
        })
    }

    /// Run the spammer for a specified duration.
    pub async fn run_for(&self, duration: Duration) -> SpammerReport {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            cancel_clone.cancel();
        });

        self.run_until_cancelled(cancel).await
    }

    /// Run with no time limit until Ctrl-C or SIGTERM.
    pub async fn run(&self) -> SpammerReport {
        let cancel = CancellationToken::new();
        cancel_on_shutdown(cancel.clone());
        self.run_until_cancelled(cancel).await
    }

    /// Run the spammer until the cancellation token is triggered.
    ///
    /// Every pipeline task is aborted on cancellation. Queued transactions
    /// are dropped unsent.
    pub async fn run_until_cancelled(&self, cancel: CancellationToken) -> SpammerReport {
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        let tracker = BlockhashTracker::new(
            self.clients.clone(),
            self.cell.clone(),
            self.config.poll_interval,
        );
        tasks.spawn(tracker.run());

        let producer = Producer::new(
            self.cell.clone(),
            self.pool.clone(),
            self.queue.clone(),
            self.config.in_flight_signs(),
            self.config.throttle_pause,
        );
        let producer_stats = producer.stats();
        tasks.spawn(producer.run());

        SenderPool::new(
            &self.clients,
            self.config.num_senders,
            self.queue.clone(),
            self.stats.clone(),
            self.matcher.clone(),
        )
        .spawn_into(&mut tasks);

        let reporter = StatsReporter::new(
            self.stats.clone(),
            self.queue.clone(),
            self.config.progress_interval,
        );
        tasks.spawn(reporter.run());

        info!(
            endpoints = self.clients.len(),
            senders = self.config.num_senders,
            queue_capacity = self.queue.capacity(),
            soft_limit = self.queue.soft_limit(),
            signing_threads = self.pool.threads(),
            "Starting spammer"
        );

        // Pipeline tasks loop forever, so an early join means one of them panicked.
        tokio::select! {
            _ = cancel.cancelled() => {}
            Some(result) = tasks.join_next() => {
                if let Err(e) = result {
                    error!(error = %e, "Pipeline task exited, stopping");
                }
            }
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        let duration = start.elapsed();
        let snapshot = self.stats.snapshot();
        println!(
            "{}",
            format_progress(duration, self.avg_tps(duration), &snapshot, self.queue.len())
        );

        SpammerReport {
            duration,
            total_submitted: snapshot.submitted,
            total_accepted: snapshot.accepted,
            total_stale: snapshot.stale,
            total_errors: snapshot.errors,
            total_signed: producer_stats.signed(),
            sign_failures: producer_stats.sign_failures(),
            blockhash_updates: self.cell.updates(),
            avg_tps: self.avg_tps(duration),
        }
    }

    fn avg_tps(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.accepted() as f64 / secs
        } else {
            0.0
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> &SpammerStats {
        &self.stats
    }

    /// The shared blockhash slot.
    pub fn blockhash_cell(&self) -> &Arc<BlockhashCell> {
        &self.cell
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn clients(&self) -> &[RpcClient] {
        &self.clients
    }

    /// Wait for all RPC endpoints to report healthy.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), SpammerError> {
        if wait_until_healthy(&self.clients, timeout, Duration::from_millis(500)).await {
            Ok(())
        } else {
            Err(SpammerError::NodesNotReady)
        }
    }
}

/// Cancel `cancel` when the process receives Ctrl-C or SIGTERM.
pub fn cancel_on_shutdown(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
        }
        cancel.cancel();
    });
}

/// Report generated after a spammer run.
#[derive(Debug, Clone)]
pub struct SpammerReport {
    /// Total duration of the run.
    pub duration: Duration,
    /// Total submission attempts.
    pub total_submitted: u64,
    /// Total transactions accepted.
    pub total_accepted: u64,
    /// Total rejections for an aged-out blockhash.
    pub total_stale: u64,
    /// Total errors (transport failures and non-stale rejections).
    pub total_errors: u64,
    /// Transactions signed and enqueued.
    pub total_signed: u64,
    /// Signing attempts that failed.
    pub sign_failures: u64,
    /// Distinct blockhashes observed.
    pub blockhash_updates: u64,
    /// Average accepted transactions per second.
    pub avg_tps: f64,
}

impl SpammerReport {
    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Spammer Report ===");
        println!("Duration: {:?}", self.duration);
        println!("Submitted: {}", self.total_submitted);
        println!("Accepted: {}", self.total_accepted);
        println!("Stale: {}", self.total_stale);
        println!("Errors: {}", self.total_errors);
        println!("Signed: {}", self.total_signed);
        println!("Sign failures: {}", self.sign_failures);
        println!("Blockhash updates: {}", self.blockhash_updates);
        println!("Avg TPS: {:.2}", self.avg_tps);
    }
}

/// Errors that can occur while setting up a run.
#[derive(Debug, thiserror::Error)]
pub enum SpammerError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Signing pool error: {0}")]
    SigningPool(#[from] SigningPoolError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),

    #[error("Nodes not ready within timeout")]
    NodesNotReady,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::keypair::Keypair;
    use crate::workloads::TransferWorkload;

    fn signer() -> Arc<dyn TransactionSigner> {
        Arc::new(TransferWorkload::new(Keypair::from_seed(&[5u8; 32])))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SpammerConfig::new(vec![]);
        assert!(matches!(
            Spammer::new(config, signer()),
            Err(SpammerError::Config(ConfigError::NoEndpoints))
        ));
    }

    #[tokio::test]
    async fn test_builds_one_client_per_endpoint() {
        let config = SpammerConfig::new(vec![
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:2".to_string(),
        ])
        .with_queue_capacity(100)
        .with_signing_threads(1);
        let spammer = Spammer::new(config, signer()).unwrap();

        assert_eq!(spammer.clients().len(), 2);
        assert_eq!(spammer.clients()[1].base_url(), "http://127.0.0.1:2");
        assert_eq!(spammer.queue().capacity(), 100);
        assert_eq!(spammer.queue().soft_limit(), 80);
        assert!(spammer.blockhash_cell().current().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_nodes_not_ready() {
        let config = SpammerConfig::new(vec!["http://127.0.0.1:1".to_string()])
            .with_request_timeout(Duration::from_millis(200))
            .with_signing_threads(1);
        let spammer = Spammer::new(config, signer()).unwrap();

        let result = spammer.wait_for_ready(Duration::from_millis(300)).await;
        assert!(matches!(result, Err(SpammerError::NodesNotReady)));
    }

    #[tokio::test]
    async fn test_run_without_blockhash_submits_nothing() {
        let config = SpammerConfig::new(vec!["http://127.0.0.1:1".to_string()])
            .with_num_senders(4)
            .with_poll_interval(Duration::from_millis(20))
            .with_request_timeout(Duration::from_millis(100))
            .with_signing_threads(1);
        let spammer = Spammer::new(config, signer()).unwrap();

        let report = spammer.run_for(Duration::from_millis(200)).await;
        assert_eq!(report.total_submitted, 0);
        assert_eq!(report.total_signed, 0);
        assert_eq!(report.blockhash_updates, 0);
        assert!(report.duration >= Duration::from_millis(200));
    }
}
