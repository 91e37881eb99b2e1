use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use kademlia_node::console::Console;
use kademlia_node::net::{self, UdpNetwork};
use kademlia_node::{Contact, KademliaDht, KademliaId, NodeConfig};

/// A peer to join through, given as `ID@IP:PORT`.
#[derive(Clone, Debug)]
struct BootstrapPeer {
    id: KademliaId,
    addr: SocketAddr,
}

impl FromStr for BootstrapPeer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id, addr) = s
            .split_once('@')
            .context("bootstrap peer must look like ID@IP:PORT")?;
        Ok(Self {
            id: id.parse().context("invalid bootstrap node id")?,
            addr: addr.parse().context("invalid bootstrap address")?,
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "kademlia-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Address peers should use to reach this node, if different from --bind.
    #[arg(long)]
    advertise: Option<SocketAddr>,

    /// Node id as 40 hex characters. Random when omitted.
    #[arg(long)]
    id: Option<KademliaId>,

    #[arg(short = 'B', long = "bootstrap", value_name = "ID@ADDR")]
    bootstrap: Vec<BootstrapPeer>,

    /// Bucket capacity and replication factor.
    #[arg(short, long, default_value_t = kademlia_node::config::DEFAULT_K)]
    k: usize,

    /// Concurrent probes per lookup round.
    #[arg(short, long, default_value_t = kademlia_node::config::DEFAULT_ALPHA)]
    alpha: usize,

    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the console
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = NodeConfig::default()
        .with_k(args.k)
        .with_alpha(args.alpha)
        .with_rpc_timeout(Duration::from_millis(args.timeout_ms));
    let id = args.id.unwrap_or_else(KademliaId::random);

    let network = UdpNetwork::bind(args.bind, id, config.rpc_timeout)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let address = match args.advertise {
        Some(address) => address,
        None => network.local_addr()?,
    };
    let me = Contact::new(id, address);
    info!("Node id: {}", me.id);

    let dht = KademliaDht::start(me, Arc::new(network.clone()), config)?;
    tokio::spawn(net::serve(network, dht.clone()));

    for peer in &args.bootstrap {
        info!("Bootstrapping from {}@{}", peer.id.short_hex(), peer.addr);
        match dht.bootstrap(Contact::new(peer.id, peer.addr)).await {
            Ok(found) => info!(contacts = found.len(), "Bootstrap complete"),
            Err(e) => warn!(error = %e, "Bootstrap failed"),
        }
    }

    let mut console = Console::new(dht, tokio::io::stdout());
    console.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}
