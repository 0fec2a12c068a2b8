//! Core value types: accounts, transactions, blocks, and hashing.

pub mod address;
pub mod block;
pub mod transaction;

pub use address::{Address, AddressError, ADDRESS_LENGTH};
pub use block::{
    is_valid_block_hash, Block, BlockError, BlockHash, BlockHeader, BLOCK_REWARD,
};
pub use transaction::{
    SignedTransaction, Transaction, TransactionError, TxHash, REWARD_REASON, SIGNATURE_LENGTH,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
