//! Blockhash Spammer CLI
//!
//! Floods one or more JSON-RPC endpoints with signed transfers, or submits a
//! single transaction as a smoke test.

use anyhow::{bail, Context, Result};
use blockhash_spammer::client::{wait_until_healthy, RpcClient};
use blockhash_spammer::config::{FileConfig, SpammerConfig};
use blockhash_spammer::keypair::{Keypair, KeypairError};
use blockhash_spammer::runner::{cancel_on_shutdown, Spammer};
use blockhash_spammer::sender::{classify, StaleMatcher, SubmitOutcome};
use blockhash_spammer::workloads::{TransactionSigner, TransferWorkload};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockhash-spammer")]
#[command(about = "Transaction spammer that tracks the latest blockhash")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

/// Options shared by every subcommand.
#[derive(Args)]
struct CommonArgs {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RPC endpoints (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Base58-encoded 64-byte payer secret key
    #[arg(long, env = "SPAMMER_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Path to a JSON keypair file
    #[arg(long)]
    keypair: Option<PathBuf>,

    /// Wait for every endpoint to report healthy before starting
    #[arg(long)]
    wait_ready: bool,

    /// Timeout applied to every RPC request (e.g., "3s")
    #[arg(long)]
    request_timeout: Option<humantime::Duration>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit transactions until stopped
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of concurrent senders
        #[arg(long)]
        senders: Option<usize>,

        /// Work queue capacity
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Fraction of the queue above which signing pauses (0.0 to 1.0]
        #[arg(long)]
        soft_threshold: Option<f64>,

        /// Lamports per transfer
        #[arg(long)]
        lamports: Option<u64>,

        /// Progress report interval (e.g., "5s")
        #[arg(long)]
        interval: Option<humantime::Duration>,

        /// Blockhash poll interval (e.g., "1s")
        #[arg(long)]
        poll_interval: Option<humantime::Duration>,

        /// Signing thread count (defaults to most of the available cores)
        #[arg(long)]
        signing_threads: Option<usize>,

        /// Stop after this long (e.g., "30s", "5m"). Runs until Ctrl+C if unset.
        #[arg(short, long)]
        duration: Option<humantime::Duration>,
    },

    /// Submit a single transaction and report how it was classified
    ///
    /// Useful for checking keys, funding and connectivity before a long run.
    SmokeTest {
        #[command(flatten)]
        common: CommonArgs,

        /// Lamports to transfer
        #[arg(long)]
        lamports: Option<u64>,
    },
}

/// Load the file config (if any) and apply CLI overrides shared by all commands.
fn load_config(common: &CommonArgs) -> Result<(SpammerConfig, FileConfig)> {
    let file = match &common.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => FileConfig::default(),
    };

    let mut config = file.clone().into_spammer_config();
    if !common.endpoints.is_empty() {
        config.rpc_endpoints = common.endpoints.clone();
    }
    if config.rpc_endpoints.is_empty() {
        config.rpc_endpoints = SpammerConfig::default().rpc_endpoints;
    }
    if let Some(timeout) = &common.request_timeout {
        config.request_timeout = **timeout;
    }
    Ok((config, file))
}

/// Resolve the payer keypair. CLI flags win over the config file.
fn load_keypair(common: &CommonArgs, file: &FileConfig) -> Result<Keypair> {
    let keypair = if let Some(key) = &common.private_key {
        Keypair::from_base58(key.trim())
    } else if let Some(path) = &common.keypair {
        Keypair::read_json_file(path)
    } else if let Some(key) = &file.private_key {
        Keypair::from_base58(key.trim())
    } else if let Some(path) = &file.keypair_path {
        Keypair::read_json_file(path)
    } else {
        Err(KeypairError::Missing)
    };
    keypair.context("Failed to load payer keypair")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            common,
            senders,
            queue_capacity,
            soft_threshold,
            lamports,
            interval,
            poll_interval,
            signing_threads,
            duration,
        } => {
            let (mut config, file) = load_config(&common)?;
            if let Some(senders) = senders {
                config = config.with_num_senders(senders);
            }
            if let Some(capacity) = queue_capacity {
                config = config.with_queue_capacity(capacity);
            }
            if let Some(fraction) = soft_threshold {
                config = config.with_soft_threshold(fraction);
            }
            if let Some(lamports) = lamports {
                config = config.with_lamports(lamports);
            }
            if let Some(interval) = interval {
                config = config.with_progress_interval(*interval);
            }
            if let Some(interval) = poll_interval {
                config = config.with_poll_interval(*interval);
            }
            if let Some(threads) = signing_threads {
                config = config.with_signing_threads(threads);
            }

            let keypair = load_keypair(&common, &file)?;
            info!(payer = %bs58::encode(keypair.pubkey()).into_string(), "Loaded payer keypair");

            let workload = TransferWorkload::new(keypair).with_lamports(config.lamports);
            let spammer = Spammer::new(config.clone(), Arc::new(workload))
                .context("Failed to build spammer")?;

            if common.wait_ready {
                println!("Waiting for nodes to be ready...");
                spammer.wait_for_ready(Duration::from_secs(60)).await?;
                println!("All nodes ready.");
            }

            println!(
                "Starting spammer: {} senders over {} endpoint(s), queue {}",
                config.num_senders,
                config.rpc_endpoints.len(),
                config.queue_capacity
            );

            let report = match duration {
                Some(duration) => {
                    let cancel = CancellationToken::new();
                    cancel_on_shutdown(cancel.clone());

                    let timer = cancel.clone();
                    let duration: Duration = *duration;
                    tokio::spawn(async move {
                        tokio::time::sleep(duration).await;
                        timer.cancel();
                    });

                    spammer.run_until_cancelled(cancel).await
                }
                None => spammer.run().await,
            };
            report.print();
        }

        Commands::SmokeTest { common, lamports } => {
            let (config, file) = load_config(&common)?;
            let keypair = load_keypair(&common, &file)?;
            let workload =
                TransferWorkload::new(keypair).with_lamports(lamports.unwrap_or(config.lamports));

            println!("=== Smoke Test ===");
            println!("Endpoints: {:?}", config.rpc_endpoints);

            let http = reqwest::Client::new();
            let clients: Vec<RpcClient> = config
                .rpc_endpoints
                .iter()
                .map(|url| RpcClient::new(url.clone(), http.clone(), config.request_timeout))
                .collect();

            if common.wait_ready {
                println!("Waiting for nodes to be ready...");
                let timeout = Duration::from_secs(60);
                if !wait_until_healthy(&clients, timeout, Duration::from_millis(500)).await {
                    bail!("Nodes not ready within {:?}", timeout);
                }
                println!("All nodes ready.");
            }

            let client = &clients[0];
            let blockhash = client
                .get_latest_blockhash()
                .await
                .context("Failed to fetch latest blockhash")?;
            println!("Blockhash: {}", blockhash);

            let tx = workload.sign(&blockhash).context("Failed to sign transaction")?;
            println!("Submitting transaction {}...", tx.id());

            let submit_start = Instant::now();
            let response = client
                .send_transaction(tx.encoded())
                .await
                .context("Failed to submit transaction")?;
            let latency = submit_start.elapsed();

            let matcher = StaleMatcher::new(&config.stale_markers);
            let outcome = classify(&response, &matcher);

            println!();
            println!("=== Smoke Test Results ===");
            println!("Outcome: {:?}", outcome);
            println!("Latency (ms): {:.2}", latency.as_secs_f64() * 1000.0);
            if let Some(error) = &response.error {
                eprintln!("Error {}: {}", error.code, error.message);
            }

            match outcome {
                SubmitOutcome::Accepted => println!("Result: SUCCESS"),
                SubmitOutcome::Stale | SubmitOutcome::Failed => {
                    println!("Result: FAILED");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
