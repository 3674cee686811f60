use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chain::{Network, NodeConfig};
use chain_index::ChainIndex;
use clap::{Parser, Subcommand};
use containers::{Bytes32, HeaderEntry, Height};
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::Metrics;
use networking::{PeerSession, SyncCoordinator};
use storage::fjall::FjallStore;
use tokio::task;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "header_node", about = "Header-only proof-of-work chain node")]
struct Args {
    /// YAML node configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured network.
    #[arg(short, long)]
    network: Option<Network>,

    /// Overrides the configured data directory.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print root, tip and checkpoint of the local index.
    Info,
    /// Print one header entry.
    Header {
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        height: Option<u64>,
        #[arg(long)]
        hash: Option<Bytes32>,
    },
    /// Truncate the index so that `height` becomes the tip.
    Reset { height: u64 },
    /// Check the persisted chain for consistency.
    Verify {
        /// Entries to check back from the tip; 0 checks everything.
        #[arg(long, default_value_t = 0)]
        depth: u64,
    },
    /// Open the node and serve metrics until interrupted.
    Run {
        #[arg(long, default_value = "127.0.0.1")]
        metrics_address: IpAddr,

        #[arg(long, default_value_t = 9464)]
        metrics_port: u16,
    },
}

impl Args {
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::new(Network::Main),
        };
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        Ok(config)
    }
}

/// Session type for a node running without a wire transport. The peer
/// transport is supplied by an embedding application; the standalone binary
/// never attaches one.
enum Detached {}

#[async_trait]
impl PeerSession for Detached {
    async fn request_headers(&self, _locator: Vec<Bytes32>) -> Result<()> {
        match *self {}
    }

    async fn disconnect(&self) {
        match *self {}
    }
}

fn open_store(config: &NodeConfig) -> Result<FjallStore> {
    let path = config.data_dir.join(config.network.to_string());
    FjallStore::open(&path).with_context(|| format!("opening store at {}", path.display()))
}

fn print_entry(label: &str, entry: &HeaderEntry) {
    println!(
        "{label}: height={} hash={} time={} bits={:#010x} work={:#x}",
        entry.height, entry.hash, entry.header.time, entry.header.bits, entry.chain_work
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.node_config()?;

    match args.command {
        Command::Info => {
            let index = ChainIndex::open(open_store(&config)?)?;
            println!("network: {}", config.network);
            match (index.root(), index.tip()) {
                (Some(root), Some(tip)) => {
                    print_entry("root", &root);
                    print_entry("tip", &tip);
                }
                _ => println!("index is empty"),
            }
            match config.network_params().last_checkpoint {
                Some(checkpoint) => {
                    println!("checkpoint: height={} hash={}", checkpoint.height, checkpoint.hash)
                }
                None => println!("checkpoint: none"),
            }
        }
        Command::Header { height, hash } => {
            let index = ChainIndex::open(open_store(&config)?)?;
            let entry = match (height, hash) {
                (Some(height), _) => index.entry_by_height(Height(height))?,
                (None, Some(hash)) => index.entry_by_hash(&hash)?,
                (None, None) => bail!("either --height or --hash is required"),
            };
            match entry {
                Some(entry) => {
                    print_entry("entry", &entry);
                    println!("raw: {}", entry.to_hex());
                }
                None => println!("not found"),
            }
        }
        Command::Reset { height } => {
            let index = ChainIndex::open(open_store(&config)?)?;
            let tip = index.reset(Height(height))?;
            print_entry("tip", &tip);
        }
        Command::Verify { depth } => {
            let index = ChainIndex::open(open_store(&config)?)?;
            let checked = index.verify(depth)?;
            println!("verified {checked} entries");
        }
        Command::Run {
            metrics_address,
            metrics_port,
        } => {
            let metrics = Arc::new(Metrics::new()?);
            let store = open_store(&config)?;
            let mut node = SyncCoordinator::<_, Detached>::new(config.clone(), store)?
                .with_metrics(metrics.clone());
            node.open().await?;

            if config.peers.is_empty() {
                info!("No peers configured");
            }
            for peer in &config.peers {
                info!(%peer, "Configured peer, awaiting transport");
            }

            let server_config = MetricsServerConfig {
                metrics_address,
                metrics_port,
            };
            let metrics_handle = task::spawn(async move {
                if let Err(err) = run_metrics_server(server_config, metrics).await {
                    error!(error = %err, "Metrics server exited");
                }
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                }
                _ = metrics_handle => {}
            }

            node.close().await?;
        }
    }

    Ok(())
}
