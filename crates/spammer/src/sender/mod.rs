//! Submission workers and response classification.
//!
//! Each worker is pinned to one endpoint for its whole life. Worker `i`
//! talks to endpoint `i % K`, so load spreads evenly without any shared
//! round-robin counter on the hot path.

use crate::client::{RpcClient, RpcError, SubmitResponse};
use crate::queue::WorkQueue;
use crate::stats::SpammerStats;
use crate::workloads::SignedTransaction;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// How a single submission ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The node took the transaction.
    Accepted,
    /// Rejected because its blockhash aged out. Expected around rotations
    /// and not counted as an error.
    Stale,
    /// Any other rejection, or a transport failure.
    Failed,
}

/// Endpoint index for each of `num_workers` workers over `num_endpoints`
/// endpoints. Empty if there are no endpoints.
pub fn assign_endpoints(num_workers: usize, num_endpoints: usize) -> Vec<usize> {
    if num_endpoints == 0 {
        return Vec::new();
    }
    (0..num_workers).map(|i| i % num_endpoints).collect()
}

/// Case-insensitive substring matcher for stale-blockhash rejections.
#[derive(Clone, Debug)]
pub struct StaleMatcher {
    markers: Vec<String>,
}

impl StaleMatcher {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Whether `message` names an expired or unknown blockhash.
    pub fn is_stale(&self, message: &str) -> bool {
        if self.markers.is_empty() || message.is_empty() {
            return false;
        }
        let message = message.to_lowercase();
        self.markers.iter().any(|m| message.contains(m.as_str()))
    }
}

impl Default for StaleMatcher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STALE_MARKERS)
    }
}

/// Classify a `sendTransaction` response.
pub fn classify(response: &SubmitResponse, matcher: &StaleMatcher) -> SubmitOutcome {
    match &response.error {
        None => SubmitOutcome::Accepted,
        Some(error) if matcher.is_stale(&error.message) => SubmitOutcome::Stale,
        Some(_) => SubmitOutcome::Failed,
    }
}

/// Classify the full result of a submission, transport failures included.
pub fn classify_result(
    result: &Result<SubmitResponse, RpcError>,
    matcher: &StaleMatcher,
) -> SubmitOutcome {
    match result {
        Ok(response) => classify(response, matcher),
        Err(_) => SubmitOutcome::Failed,
    }
}

/// One submission worker.
pub struct SenderWorker {
    id: usize,
    client: RpcClient,
    queue: WorkQueue,
    stats: Arc<SpammerStats>,
    matcher: Arc<StaleMatcher>,
}

impl SenderWorker {
    pub fn new(
        id: usize,
        client: RpcClient,
        queue: WorkQueue,
        stats: Arc<SpammerStats>,
        matcher: Arc<StaleMatcher>,
    ) -> Self {
        Self {
            id,
            client,
            queue,
            stats,
            matcher,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.base_url()
    }

    /// Submit one transaction once and record the outcome.
    pub async fn submit(&self, tx: &SignedTransaction) -> SubmitOutcome {
        let result = self.client.send_transaction(tx.encoded()).await;
        let outcome = classify_result(&result, &self.matcher);

        match (&result, outcome) {
            (Err(e), _) => {
                debug!(worker = self.id, error = %e, "Failed to submit transaction");
            }
            (Ok(response), SubmitOutcome::Stale | SubmitOutcome::Failed) => {
                let error = response.error.clone().unwrap_or_default();
                debug!(
                    worker = self.id,
                    code = error.code,
                    message = %error.message,
                    stale = outcome == SubmitOutcome::Stale,
                    "Transaction rejected"
                );
            }
            (Ok(_), SubmitOutcome::Accepted) => {}
        }

        self.stats.record(outcome);
        outcome
    }

    /// Pull from the queue and submit until the queue closes.
    pub async fn run(self) {
        while let Some(tx) = self.queue.pop().await {
            self.submit(&tx).await;
        }
    }
}

/// The full set of submission workers.
pub struct SenderPool {
    workers: Vec<SenderWorker>,
}

impl SenderPool {
    /// Build `num_senders` workers spread round-robin over `clients`.
    pub fn new(
        clients: &[RpcClient],
        num_senders: usize,
        queue: WorkQueue,
        stats: Arc<SpammerStats>,
        matcher: Arc<StaleMatcher>,
    ) -> Self {
        let workers = assign_endpoints(num_senders, clients.len())
            .into_iter()
            .enumerate()
            .map(|(id, endpoint)| {
                SenderWorker::new(
                    id,
                    clients[endpoint].clone(),
                    queue.clone(),
                    stats.clone(),
                    matcher.clone(),
                )
            })
            .collect();
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[SenderWorker] {
        &self.workers
    }

    /// Spawn every worker onto `tasks`.
    pub fn spawn_into(self, tasks: &mut JoinSet<()>) {
        info!(senders = self.workers.len(), "Starting sender pool");
        for worker in self.workers {
            tasks.spawn(worker.run());
        }
    }
}
