//! RecycleChain node CLI

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use recycle_chain::api;
use recycle_chain::{calculate_rewards, compute_environmental_impact, EWasteItem, Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "recycle-node", version)]
#[command(about = "RecycleChain node - e-waste custody ledger with PoW consensus")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start a node and serve its HTTP API
    Run {
        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Peer to register at startup; repeatable
        #[arg(long = "peer")]
        peers: Vec<String>,

        /// Block proof difficulty in leading zero hex digits
        #[arg(long)]
        difficulty: Option<usize>,
    },

    /// Print reward and impact for a JSON array of items
    Rewards {
        items: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(Level::INFO.as_str())),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Run { config, listen, peers, difficulty } => {
            let mut cfg = match config {
                Some(path) => NodeConfig::load(path)?,
                None => NodeConfig::default(),
            };
            if let Some(addr) = listen {
                cfg.listen_addr = addr.to_string();
            }
            if let Some(d) = difficulty {
                cfg.chain_difficulty = d;
            }
            cfg.bootstrap_peers.extend(peers);

            let node = Node::from_config(&cfg)?;
            let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
                .await
                .with_context(|| format!("binding {}", cfg.listen_addr))?;
            info!(addr = %cfg.listen_addr, "RecycleChain node starting");
            api::serve(node, listener).await?;
        }
        Cmd::Rewards { items } => {
            let buf = std::fs::read(&items).with_context(|| format!("reading {}", items.display()))?;
            let items: Vec<EWasteItem> = serde_json::from_slice(&buf).context("parsing item list")?;
            let out = serde_json::json!({
                "reward": calculate_rewards(&items),
                "environmental_impact": compute_environmental_impact(&items),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
