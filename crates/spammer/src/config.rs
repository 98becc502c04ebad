//! Configuration types for the spammer.

use crate::signing_pool;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error-message fragments that mark a submission as rejected for carrying
/// an aged-out blockhash.
pub const DEFAULT_STALE_MARKERS: &[&str] = &["blockhash", "expired"];

/// Configuration for the transaction spammer.
#[derive(Clone, Debug)]
pub struct SpammerConfig {
    /// JSON-RPC endpoints. Senders are bound to these round-robin; the
    /// blockhash tracker polls a random one each time.
    pub rpc_endpoints: Vec<String>,

    /// Number of concurrent sender tasks.
    pub num_senders: usize,

    /// Maximum number of signed transactions waiting in the queue.
    pub queue_capacity: usize,

    /// Fraction of `queue_capacity` above which the producer stops signing.
    pub soft_threshold: f64,

    /// Lamports moved by each transfer.
    pub lamports: u64,

    /// Interval between progress reports.
    pub progress_interval: Duration,

    /// Interval between blockhash polls.
    pub poll_interval: Duration,

    /// Timeout applied to every RPC request.
    pub request_timeout: Duration,

    /// How long the producer sleeps when the queue is above the soft threshold.
    pub throttle_pause: Duration,

    /// Number of threads in the signing pool.
    pub signing_threads: usize,

    /// Maximum number of signing jobs the producer keeps outstanding.
    /// Defaults to twice the signing pool size.
    pub max_in_flight_signs: Option<usize>,

    /// Case-insensitive fragments identifying stale-blockhash rejections.
    pub stale_markers: Vec<String>,
}

impl Default for SpammerConfig {
    fn default() -> Self {
        Self {
            rpc_endpoints: vec!["http://localhost:8899".into()],
            num_senders: 150,
            queue_capacity: 3000,
            soft_threshold: 0.8,
            lamports: 1,
            progress_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(3),
            throttle_pause: Duration::from_micros(500),
            signing_threads: signing_pool::default_signing_threads(),
            max_in_flight_signs: None,
            stale_markers: DEFAULT_STALE_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SpammerConfig {
    /// Create a new configuration with the given endpoints.
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            rpc_endpoints: endpoints,
            ..Default::default()
        }
    }

    /// Set the number of sender tasks.
    pub fn with_num_senders(mut self, num_senders: usize) -> Self {
        self.num_senders = num_senders;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the soft threshold as a fraction of the queue capacity.
    pub fn with_soft_threshold(mut self, fraction: f64) -> Self {
        self.soft_threshold = fraction;
        self
    }

    /// Set the transfer amount.
    pub fn with_lamports(mut self, lamports: u64) -> Self {
        self.lamports = lamports;
        self
    }

    /// Set the progress report interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the blockhash poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the producer's pause when throttled.
    pub fn with_throttle_pause(mut self, pause: Duration) -> Self {
        self.throttle_pause = pause;
        self
    }

    /// Set the signing pool size.
    pub fn with_signing_threads(mut self, threads: usize) -> Self {
        self.signing_threads = threads;
        self
    }

    /// Set the maximum number of outstanding signing jobs.
    pub fn with_max_in_flight_signs(mut self, max: usize) -> Self {
        self.max_in_flight_signs = Some(max);
        self
    }

    /// Replace the stale-blockhash markers.
    pub fn with_stale_markers(mut self, markers: Vec<String>) -> Self {
        self.stale_markers = markers;
        self
    }

    /// Effective number of outstanding signing jobs.
    pub fn in_flight_signs(&self) -> usize {
        self.max_in_flight_signs
            .unwrap_or(self.signing_threads * 2)
            .max(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.num_senders == 0 {
            return Err(ConfigError::InvalidSenders);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        if !(self.soft_threshold > 0.0 && self.soft_threshold <= 1.0) {
            return Err(ConfigError::InvalidSoftThreshold(self.soft_threshold));
        }
        if self.signing_threads == 0 {
            return Err(ConfigError::InvalidSigningThreads);
        }
        if self.progress_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("progress_interval"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll_interval"));
        }
        Ok(())
    }
}

/// On-disk configuration (TOML).
///
/// ```toml
/// rpc_endpoints = ["https://rpc.testnet.example"]
/// num_senders = 150
/// queue_capacity = 3000
/// soft_threshold = 0.8
/// lamports = 1
/// progress_interval_ms = 5000
/// keypair_path = "~/.config/solana/id.json"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub rpc_endpoints: Vec<String>,

    #[serde(default = "default_num_senders")]
    pub num_senders: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_soft_threshold")]
    pub soft_threshold: f64,

    #[serde(default = "default_lamports")]
    pub lamports: u64,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_throttle_pause_us")]
    pub throttle_pause_us: u64,

    /// Signing pool size (auto-detected if unset).
    #[serde(default)]
    pub signing_threads: Option<usize>,

    #[serde(default)]
    pub max_in_flight_signs: Option<usize>,

    #[serde(default)]
    pub stale_markers: Option<Vec<String>>,

    /// Base58-encoded 64-byte secret key.
    #[serde(default)]
    pub private_key: Option<String>,

    /// Path to a JSON keypair file (array of 64 bytes).
    #[serde(default)]
    pub keypair_path: Option<PathBuf>,
}

fn default_num_senders() -> usize {
    150
}

fn default_queue_capacity() -> usize {
    3000
}

fn default_soft_threshold() -> f64 {
    0.8
}

fn default_lamports() -> u64 {
    1
}

fn default_progress_interval_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

fn default_throttle_pause_us() -> u64 {
    500
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            rpc_endpoints: Vec::new(),
            num_senders: default_num_senders(),
            queue_capacity: default_queue_capacity(),
            soft_threshold: default_soft_threshold(),
            lamports: default_lamports(),
            progress_interval_ms: default_progress_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            throttle_pause_us: default_throttle_pause_us(),
            signing_threads: None,
            max_in_flight_signs: None,
            stale_markers: None,
            private_key: None,
            keypair_path: None,
        }
    }
}

impl FileConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Convert into a runtime configuration. Key material is resolved separately.
    pub fn into_spammer_config(self) -> SpammerConfig {
        let mut config = SpammerConfig::new(self.rpc_endpoints)
            .with_num_senders(self.num_senders)
            .with_queue_capacity(self.queue_capacity)
            .with_soft_threshold(self.soft_threshold)
            .with_lamports(self.lamports)
            .with_progress_interval(Duration::from_millis(self.progress_interval_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_throttle_pause(Duration::from_micros(self.throttle_pause_us));

        if let Some(threads) = self.signing_threads {
            config = config.with_signing_threads(threads);
        }
        if let Some(max) = self.max_in_flight_signs {
            config = config.with_max_in_flight_signs(max);
        }
        if let Some(markers) = self.stale_markers {
            config = config.with_stale_markers(markers);
        }
        config
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No RPC endpoints configured")]
    NoEndpoints,

    #[error("Number of senders must be greater than 0")]
    InvalidSenders,

    #[error("Queue capacity must be greater than 0")]
    InvalidQueueCapacity,

    #[error("Soft threshold must be in (0, 1], got {0}")]
    InvalidSoftThreshold(f64),

    #[error("Signing threads must be greater than 0")]
    InvalidSigningThreads,

    #[error("{0} must be greater than 0")]
    ZeroInterval(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SpammerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.num_senders, 150);
        assert_eq!(config.queue_capacity, 3000);
        assert_eq!(config.stale_markers, vec!["blockhash", "expired"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            SpammerConfig::new(vec![]).validate(),
            Err(ConfigError::NoEndpoints)
        ));
        assert!(matches!(
            SpammerConfig::default().with_num_senders(0).validate(),
            Err(ConfigError::InvalidSenders)
        ));
        assert!(matches!(
            SpammerConfig::default().with_queue_capacity(0).validate(),
            Err(ConfigError::InvalidQueueCapacity)
        ));
        assert!(matches!(
            SpammerConfig::default().with_soft_threshold(0.0).validate(),
            Err(ConfigError::InvalidSoftThreshold(_))
        ));
        assert!(matches!(
            SpammerConfig::default().with_soft_threshold(1.5).validate(),
            Err(ConfigError::InvalidSoftThreshold(_))
        ));
        assert!(matches!(
            SpammerConfig::default()
                .with_progress_interval(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroInterval("progress_interval"))
        ));
    }

    #[test]
    fn test_in_flight_signs_defaults_to_twice_pool() {
        let config = SpammerConfig::default().with_signing_threads(4);
        assert_eq!(config.in_flight_signs(), 8);

        let config = config.with_max_in_flight_signs(3);
        assert_eq!(config.in_flight_signs(), 3);
    }

    #[test]
    fn test_file_config_defaults() {
        let file = FileConfig::from_toml_str(r#"rpc_endpoints = ["http://a:8899"]"#).unwrap();
        let config = file.into_spammer_config();

        assert_eq!(config.rpc_endpoints, vec!["http://a:8899"]);
        assert_eq!(config.num_senders, 150);
        assert_eq!(config.progress_interval, Duration::from_secs(5));
        assert_eq!(config.throttle_pause, Duration::from_micros(500));
        config.validate().unwrap();
    }

    #[test]
    fn test_file_config_overrides() {
        let toml = r#"
            rpc_endpoints = ["http://a:8899", "http://b:8899"]
            num_senders = 8
            queue_capacity = 100
            soft_threshold = 0.5
            lamports = 42
            poll_interval_ms = 250
            signing_threads = 2
            stale_markers = ["Blockhash not found"]
            private_key = "abc"
        "#;
        let file = FileConfig::from_toml_str(toml).unwrap();
        assert_eq!(file.private_key.as_deref(), Some("abc"));

        let config = file.into_spammer_config();
        assert_eq!(config.num_senders, 8);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.lamports, 42);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.signing_threads, 2);
        assert_eq!(config.stale_markers, vec!["Blockhash not found"]);
    }

    #[test]
    fn test_file_config_rejects_unknown_fields() {
        let result = FileConfig::from_toml_str("num_sender = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_file_config_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spammer.toml");
        std::fs::write(&path, "rpc_endpoints = [\"http://x\"]\nnum_senders = 3\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.num_senders, 3);

        let missing = FileConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
