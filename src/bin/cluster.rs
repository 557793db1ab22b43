use anyhow::Result;
use clap::{Parser, Subcommand};
use minibank::common::{parse_duration, MemberConfig};
use minibank::{Cluster, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "minibank-cluster")]
#[command(about = "minibank cluster - in-process replicated ledger with an HTTP API")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the cluster and serve the HTTP API
    Serve {
        /// Config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Member ids, e.g. 1,2,3
        #[arg(long, value_delimiter = ',')]
        nodes: Option<Vec<u64>>,

        /// HTTP bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Heartbeat interval (e.g. 100ms, 1s)
        #[arg(long)]
        heartbeat_interval: Option<String>,

        /// Leader silence before a follower gives up on it
        #[arg(long)]
        heartbeat_timeout: Option<String>,

        /// How long an initiator waits for an ack
        #[arg(long)]
        election_timeout: Option<String>,

        /// Initial balances, e.g. --seed A=500 --seed B=100
        #[arg(long = "seed", value_parser = parse_seed)]
        seeds: Vec<(String, i64)>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,
    },
}

fn parse_seed(s: &str) -> std::result::Result<(String, i64), String> {
    let (account, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ACCOUNT=AMOUNT, got '{}'", s))?;
    let amount = amount
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid amount '{}': {}", amount, e))?;
    Ok((account.trim().to_string(), amount))
}

fn duration_ms(s: &str) -> Result<u64> {
    Ok(parse_duration(s)?.as_millis() as u64)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Serve {
            config,
            nodes,
            bind,
            heartbeat_interval,
            heartbeat_timeout,
            election_timeout,
            seeds,
            log_level,
        } => {
            let mut config = Config::load(config.as_deref())?;

            if let Some(ids) = nodes {
                config.cluster.members = ids.into_iter().map(MemberConfig::new).collect();
            }
            if let Some(addr) = bind {
                config.api.bind_addr = addr;
            }
            if let Some(interval) = heartbeat_interval {
                config.cluster = config.cluster.with_heartbeat_interval_ms(duration_ms(&interval)?);
            }
            if let Some(timeout) = heartbeat_timeout {
                config.cluster.heartbeat_timeout_ms = duration_ms(&timeout)?;
            }
            if let Some(timeout) = election_timeout {
                config.cluster.election_timeout_ms = duration_ms(&timeout)?;
            }
            config.cluster.seed.extend(seeds);
            if let Some(level) = log_level {
                config.log_level = level;
            }

            // Initialize tracing
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            tracing::info!("Starting minibank cluster {}", minibank::BUILD_INFO);
            tracing::info!("Members: {:?}", config.cluster.member_ids());
            tracing::info!(
                "Heartbeat: every {}ms, timeout {}ms; election timeout {}ms",
                config.cluster.heartbeat_interval_ms,
                config.cluster.heartbeat_timeout_ms,
                config.cluster.election_timeout_ms
            );

            let cluster = Arc::new(Cluster::start(config.cluster)?);
            cluster.serve(config.api).await?;
        }
    }

    Ok(())
}
