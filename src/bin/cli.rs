//! CLI for a running cluster

use clap::{Parser, Subcommand};
use minibank::ClusterClient;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "minibank")]
#[command(about = "minibank replicated ledger CLI")]
#[command(version)]
struct Cli {
    /// Cluster API URL
    #[arg(long, default_value = "http://127.0.0.1:7000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cluster status (or one node with --node)
    Status {
        #[arg(long)]
        node: Option<u64>,
    },

    /// Submit a balance change
    Submit {
        /// Account id
        account: String,

        /// Signed amount in minor units
        #[arg(allow_hyphen_values = true)]
        delta: i64,

        /// Send to this node instead of the cluster router
        #[arg(long)]
        node: Option<u64>,
    },

    /// Crash a node
    Crash { node: u64 },

    /// Recover a crashed node
    Recover { node: u64 },

    /// Make a node start an election
    Elect { node: u64 },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = ClusterClient::new(&cli.url)?;

    match cli.command {
        Commands::Status { node: Some(id) } => print_json(&client.node_status(id).await?)?,
        Commands::Status { node: None } => print_json(&client.status().await?)?,

        Commands::Submit {
            account,
            delta,
            node,
        } => {
            let result = client.submit(node, &account, delta).await?;
            print_json(&result)?;
            if !result.accepted {
                std::process::exit(1);
            }
        }

        Commands::Crash { node } => print_json(&client.crash(node).await?)?,
        Commands::Recover { node } => print_json(&client.recover(node).await?)?,
        Commands::Elect { node } => print_json(&client.start_election(node).await?)?,
    }

    Ok(())
}
