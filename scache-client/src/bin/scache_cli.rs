//! Command-line tool issuing single cache operations.
//!
//! Usage:
//! ```text
//!   scache-cli get <cache> <key>
//!   scache-cli set <cache> <key> <value> [--ttl-secs <seconds>]
//!   scache-cli delete <cache> <key>
//!   scache-cli incr <cache> <key> [amount]
//! ```
//!
//! Environment:
//! - SCACHE_API_KEY: credential (required)
//! - SCACHE_ENDPOINT: data endpoint, `host` or `host:port` (required)
//! - SCACHE_CHANNEL_COUNT, SCACHE_TIMEOUT_MS, SCACHE_TLS: optional overrides
//! - RUST_LOG: log filter, defaults to `warn`

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scache_client::{
    CacheClient, ClientConfig, DeleteResponse, GetResponse, IncrementResponse, SetResponse,
};

#[derive(Debug, Parser)]
#[command(name = "scache-cli", version, about = "Issue single operations against the cache")]
struct Cli {
    /// Config file (JSON); the SCACHE_* environment is used when absent.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Per-call timeout override in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a value.
    Get { cache: String, key: String },
    /// Store a value.
    Set {
        cache: String,
        key: String,
        value: String,
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Remove a key.
    Delete { cache: String, key: String },
    /// Add to an integer counter.
    Incr {
        cache: String,
        key: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        amount: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ClientConfig::from_json(&content)?
        }
        None => ClientConfig::from_env()?,
    };

    let mut client = CacheClient::connect(config)?;
    if let Some(ms) = cli.timeout_ms {
        client = client.with_timeout(Duration::from_millis(ms));
    }

    let outcome = run(&client, cli.command).await;
    client.close().await;
    outcome
}

async fn run(client: &CacheClient, command: Command) -> Result<()> {
    match command {
        Command::Get { cache, key } => match client.get(&cache, &key).await {
            GetResponse::Hit { value } => println!("{}", String::from_utf8_lossy(&value)),
            GetResponse::Miss => println!("(miss)"),
            GetResponse::Error(err) => return Err(err.into()),
        },
        Command::Set {
            cache,
            key,
            value,
            ttl_secs,
        } => {
            let response = match ttl_secs {
                Some(secs) => {
                    client
                        .set_with_ttl(&cache, &key, value, Duration::from_secs(secs))
                        .await
                }
                None => client.set(&cache, &key, value).await,
            };
            match response {
                SetResponse::Success => println!("OK"),
                SetResponse::Error(err) => return Err(err.into()),
            }
        }
        Command::Delete { cache, key } => match client.delete(&cache, &key).await {
            DeleteResponse::Success => println!("OK"),
            DeleteResponse::Error(err) => return Err(err.into()),
        },
        Command::Incr { cache, key, amount } => {
            match client.increment(&cache, &key, amount).await {
                IncrementResponse::Success { value } => println!("{value}"),
                IncrementResponse::Error(err) => return Err(err.into()),
            }
        }
    }
    Ok(())
}
