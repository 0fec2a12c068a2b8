//! Proof-of-work mining.
//!
//! The search increments the header nonce from zero, rehashing the candidate
//! block until the hash satisfies the difficulty predicate. It is CPU-bound
//! and unbounded in duration, so callers run it on a blocking thread and hold
//! a [`CancelHandle`] to stop it between attempts.

use crate::types::{is_valid_block_hash, unix_now, Address, Block, BlockHash, SignedTransaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Log search progress every this many attempts.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// A block awaiting its proof-of-work nonce.
#[derive(Clone, Debug)]
pub struct PendingBlock {
    pub parent: BlockHash,
    pub number: u64,
    pub miner: Address,
    /// Stamped at construction; every restart of the search builds a fresh
    /// pending block so the timestamp never goes stale.
    pub time: u64,
    pub txs: Vec<SignedTransaction>,
}

impl PendingBlock {
    /// Assemble a pending block stamped with the current time.
    pub fn new(
        parent: BlockHash,
        number: u64,
        miner: Address,
        txs: Vec<SignedTransaction>,
    ) -> Self {
        Self {
            parent,
            number,
            miner,
            time: unix_now(),
            txs,
        }
    }
}

/// Cooperative cancellation flag for an in-flight search.
///
/// Cheap to clone, safe to trigger repeatedly and from any task.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Mining outcomes that are not a block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MineError {
    #[error("mining an empty block is not allowed")]
    NoTransactions,

    #[error("mining cancelled")]
    Cancelled,
}

/// Search for a nonce whose block hash satisfies the difficulty predicate.
///
/// The cancellation flag is polled on every attempt, so a cancel request is
/// honored within one hash computation. Exhausting the 32-bit nonce space
/// re-stamps the block time and starts the search over.
pub fn mine(pending: &PendingBlock, cancel: &CancelHandle) -> Result<Block, MineError> {
    if pending.txs.is_empty() {
        return Err(MineError::NoTransactions);
    }

    let started = Instant::now();
    let mut candidate = Block::new(
        pending.parent,
        pending.number,
        0,
        pending.time,
        pending.miner,
        pending.txs.clone(),
    );
    let mut attempts: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            info!(
                number = pending.number,
                attempts,
                "mining cancelled mid-search"
            );
            return Err(MineError::Cancelled);
        }

        let hash = candidate.hash();
        if is_valid_block_hash(&hash) {
            info!(
                number = candidate.header.number,
                nonce = candidate.header.nonce,
                hash = %hash,
                attempts,
                elapsed_secs = started.elapsed().as_secs(),
                "mined new block"
            );
            return Ok(candidate);
        }

        attempts += 1;
        if attempts % PROGRESS_INTERVAL == 0 {
            debug!(number = candidate.header.number, attempts, "still mining");
        }

        candidate.header.nonce = match candidate.header.nonce.checked_add(1) {
            Some(nonce) => nonce,
            None => {
                // Nonce space exhausted: a fresh timestamp reopens it
                candidate.header.time = unix_now();
                0
            }
        };
    }
}
