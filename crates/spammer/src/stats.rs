//! Submission counters and the periodic progress reporter.

use crate::queue::WorkQueue;
use crate::sender::SubmitOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters shared by every sender. They only ever increase.
#[derive(Debug, Default)]
pub struct SpammerStats {
    /// Submission attempts.
    submitted: AtomicU64,
    /// Transactions the node accepted.
    accepted: AtomicU64,
    /// Rejections for an aged-out blockhash.
    stale: AtomicU64,
    /// Transport failures and non-stale rejections.
    errors: AtomicU64,
}

/// Point-in-time copy of [`SpammerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub accepted: u64,
    pub stale: u64,
    pub errors: u64,
}

impl SpammerStats {
    /// Count one finished submission.
    pub fn record(&self, outcome: SubmitOutcome) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            SubmitOutcome::Accepted => &self.accepted,
            SubmitOutcome::Stale => &self.stale,
            SubmitOutcome::Failed => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Read all counters. Fields are loaded independently.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted(),
            accepted: self.accepted(),
            stale: self.stale(),
            errors: self.errors(),
        }
    }
}

/// Turns successive accepted totals into a per-interval rate.
#[derive(Debug)]
pub struct ThroughputSampler {
    prev_accepted: u64,
    interval: Duration,
}

impl ThroughputSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            prev_accepted: 0,
            interval,
        }
    }

    /// Accepted transactions per second since the previous sample.
    pub fn sample(&mut self, accepted_now: u64) -> f64 {
        let delta = accepted_now.saturating_sub(self.prev_accepted);
        self.prev_accepted = accepted_now;

        let secs = self.interval.as_secs_f64();
        if secs > 0.0 {
            delta as f64 / secs
        } else {
            0.0
        }
    }
}

/// One progress line.
pub fn format_progress(
    elapsed: Duration,
    tps: f64,
    snapshot: &StatsSnapshot,
    queue_len: usize,
) -> String {
    format!(
        "[{:>3}s] tps: {:.0} | accepted: {} | errors: {} | stale: {} | queue: {}",
        elapsed.as_secs(),
        tps,
        snapshot.accepted,
        snapshot.errors,
        snapshot.stale,
        queue_len
    )
}

/// Prints a progress line every interval. Never touches the counters.
pub struct StatsReporter {
    stats: Arc<SpammerStats>,
    queue: WorkQueue,
    interval: Duration,
    started: Instant,
}

impl StatsReporter {
    pub fn new(stats: Arc<SpammerStats>, queue: WorkQueue, interval: Duration) -> Self {
        Self {
            stats,
            queue,
            interval,
            started: Instant::now(),
        }
    }

    pub async fn run(self) {
        let mut sampler = ThroughputSampler::new(self.interval);
        loop {
            tokio::time::sleep(self.interval).await;
            let snapshot = self.stats.snapshot();
            let tps = sampler.sample(snapshot.accepted);
            println!(
                "{}",
                format_progress(self.started.elapsed(), tps, &snapshot, self.queue.len())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_rate() {
        let mut sampler = ThroughputSampler::new(Duration::from_secs(5));
        sampler.sample(100);
        assert_eq!(sampler.sample(350), 50.0);
        assert_eq!(sampler.sample(350), 0.0);
    }

    #[test]
    fn test_sampler_first_interval_counts_from_zero() {
        let mut sampler = ThroughputSampler::new(Duration::from_secs(2));
        assert_eq!(sampler.sample(10), 5.0);
    }

    #[test]
    fn test_sampler_zero_interval() {
        let mut sampler = ThroughputSampler::new(Duration::ZERO);
        assert_eq!(sampler.sample(1000), 0.0);
    }

    #[test]
    fn test_record_outcomes() {
        let stats = SpammerStats::default();
        stats.record(SubmitOutcome::Accepted);
        stats.record(SubmitOutcome::Accepted);
        stats.record(SubmitOutcome::Stale);
        stats.record(SubmitOutcome::Failed);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                submitted: 4,
                accepted: 2,
                stale: 1,
                errors: 1,
            }
        );
    }

    #[test]
    fn test_concurrent_record() {
        let stats = Arc::new(SpammerStats::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record(SubmitOutcome::Accepted);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.accepted(), 8000);
        assert_eq!(stats.submitted(), 8000);
    }

    #[test]
    fn test_progress_line() {
        let snapshot = StatsSnapshot {
            submitted: 400,
            accepted: 350,
            stale: 20,
            errors: 30,
        };
        assert_eq!(
            format_progress(Duration::from_secs(10), 50.0, &snapshot, 2400),
            "[ 10s] tps: 50 | accepted: 350 | errors: 30 | stale: 20 | queue: 2400"
        );
    }
}
