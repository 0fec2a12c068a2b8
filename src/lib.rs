//! tinychain: a minimal peer-to-peer ledger node
//!
//! tinychain maintains an append-only chain of blocks over an account/balance
//! state, mines new blocks with a fixed-difficulty proof-of-work search, and
//! synchronizes with other nodes over a pull-gossip HTTP protocol.
//!
//! ## Modules
//! - `types` - core value types (addresses, transactions, blocks, hashing)
//! - `wallet` - ECDSA signing/recovery and the encrypted keystore
//! - `state` - genesis loading, the durable block log, and the ledger state machine
//! - `miner` - the cancellable proof-of-work search
//! - `node` - the node coordinator, HTTP API, and sync client

pub mod miner;
pub mod node;
pub mod state;
pub mod types;
pub mod wallet;

pub use node::{Node, NodeConfig};
pub use state::Ledger;
pub use types::{Address, Block, BlockHash, SignedTransaction, Transaction, TxHash};

/// Result type for tinychain operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur across the node
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("transaction error: {0}")]
    Transaction(#[from] types::TransactionError),

    #[error("block error: {0}")]
    Block(#[from] types::BlockError),

    #[error("state error: {0}")]
    State(#[from] state::StateError),

    #[error("wallet error: {0}")]
    Wallet(#[from] wallet::WalletError),

    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
