//! tinychain CLI
//!
//! ```bash
//! # Start a node
//! tinychain run --datadir ~/.tinychain --port 8086 --miner 0x…
//!
//! # Create a keystore account
//! tinychain wallet new-account --datadir ~/.tinychain
//!
//! # List balances
//! tinychain balances list --datadir ~/.tinychain
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tinychain::node::config::{DEFAULT_HTTP_PORT, DEFAULT_IP};
use tinychain::node::PeerNode;
use tinychain::state::{init_data_dir, DEFAULT_GENESIS_JSON};
use tinychain::types::Address;
use tinychain::wallet;
use tinychain::{Ledger, Node, NodeConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// tinychain - a teaching-scale peer-to-peer ledger node
#[derive(Parser)]
#[command(name = "tinychain")]
#[command(version)]
#[command(about = "tinychain node and CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node and its HTTP API
    Run(RunArgs),

    /// Inspect account balances
    Balances(BalancesArgs),

    /// Manage keystore accounts
    Wallet(WalletArgs),

    /// Show version
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Directory for blockchain data and the keystore
    #[arg(long)]
    datadir: PathBuf,

    /// IP to expose for peer communication
    #[arg(long, default_value = DEFAULT_IP)]
    ip: String,

    /// HTTP port to expose for peer communication
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    port: u16,

    /// Account credited with this node's block rewards
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    miner: Address,

    /// Bootstrap peer IP to interconnect with
    #[arg(long)]
    bootstrap_ip: Option<String>,

    /// Bootstrap peer port
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    bootstrap_port: u16,

    /// Bootstrap peer account
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    bootstrap_account: Address,
}

#[derive(Args)]
struct BalancesArgs {
    #[command(subcommand)]
    command: BalancesCommand,
}

#[derive(Subcommand)]
enum BalancesCommand {
    /// List balances at the latest block
    List {
        /// Directory for blockchain data
        #[arg(long)]
        datadir: PathBuf,
    },
}

#[derive(Args)]
struct WalletArgs {
    #[command(subcommand)]
    command: WalletCommand,
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Generate a new password-protected account
    NewAccount {
        /// Directory for blockchain data and the keystore
        #[arg(long)]
        datadir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_node(args).await?,
        Commands::Balances(args) => match args.command {
            BalancesCommand::List { datadir } => list_balances(datadir)?,
        },
        Commands::Wallet(args) => match args.command {
            WalletCommand::NewAccount { datadir } => new_account(datadir)?,
        },
        Commands::Version => println!("tinychain {}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}

async fn run_node(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = NodeConfig::new(args.datadir, args.ip, args.port, args.miner);

    if let Some(bootstrap_ip) = args.bootstrap_ip {
        config = config.with_bootstrap(PeerNode::new(
            bootstrap_ip,
            args.bootstrap_port,
            true,
            args.bootstrap_account,
            false,
        ));
    }

    let node = Node::new(config)?;
    info!("node running, press Ctrl+C to stop");
    node.run().await?;

    info!("node stopped");
    Ok(())
}

fn list_balances(datadir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    init_data_dir(&datadir, DEFAULT_GENESIS_JSON)?;
    let ledger = Ledger::from_disk(&datadir)?;

    println!("Account balances at {}", ledger.latest_block_hash());
    println!("-----------------------");
    println!();
    for (account, balance) in ledger.balances() {
        println!("{account}: {balance}");
    }

    Ok(())
}

fn new_account(datadir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if password != confirm {
        return Err("passwords do not match".into());
    }

    let account = wallet::create_account(&datadir, &password)?;
    println!("New account created: {account}");
    println!("Keystore: {}", wallet::keystore_dir(&datadir).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
