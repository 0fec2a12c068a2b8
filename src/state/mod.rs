//! Ledger state: genesis loading, the durable block log, and the state machine.

pub mod disk;
pub mod genesis;
pub mod ledger;

pub use disk::{BlockLog, BlockRecord};
pub use genesis::{init_data_dir, Genesis, DEFAULT_GENESIS_JSON};
pub use ledger::Ledger;

use crate::types::{BlockError, TransactionError};

/// Errors from ledger construction, block application, and persistence.
///
/// Block-log I/O failures are fatal to the node process: state durability can
/// no longer be guaranteed once the log cannot be written.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("block log I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Codec(#[from] serde_json::Error),
}
