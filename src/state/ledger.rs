//! The ledger state machine.
//!
//! Owns account balances and per-sender nonces plus the pointer to the latest
//! accepted block. All mutation goes through block application: transactions
//! are applied to a scratch copy of the maps and the result is committed only
//! if the whole block succeeds, so a failing block leaves the ledger
//! untouched.

use super::disk::{BlockLog, BlockRecord};
use super::genesis::{block_db_path, genesis_json_path, Genesis};
use super::StateError;
use crate::types::{
    is_valid_block_hash, Address, Block, BlockError, BlockHash, SignedTransaction,
    TransactionError, BLOCK_REWARD,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Balances, nonces, and the chain head, backed by the durable block log.
pub struct Ledger {
    balances: HashMap<Address, u64>,
    account_nonces: HashMap<Address, u64>,
    latest_block: Option<Block>,
    latest_block_hash: BlockHash,
    log: BlockLog,
}

/// Scratch result of validating a block, ready to commit.
struct PreparedBlock {
    hash: BlockHash,
    balances: HashMap<Address, u64>,
    account_nonces: HashMap<Address, u64>,
}

impl Ledger {
    /// Rebuild the ledger by replaying the persisted block log on top of the
    /// genesis balances.
    ///
    /// Replay re-applies every transaction (signatures, nonces, balances) but
    /// does not repeat the proof-of-work check: the log only ever receives
    /// blocks that already passed it.
    pub fn from_disk(data_dir: &Path) -> Result<Self, StateError> {
        let genesis = Genesis::load(&genesis_json_path(data_dir))?;
        let log = BlockLog::open(&block_db_path(data_dir))?;
        let records = log.records()?;

        let mut ledger = Self {
            balances: genesis.balances,
            account_nonces: HashMap::new(),
            latest_block: None,
            latest_block_hash: BlockHash::ZERO,
            log,
        };

        let replayed = records.len();
        for record in records {
            let prepared = ledger.prepare(&record.block, false)?;
            ledger.commit(record.block, prepared);
        }

        info!(
            blocks = replayed,
            height = ledger.latest_block_number(),
            hash = %ledger.latest_block_hash,
            "ledger rebuilt from disk"
        );
        Ok(ledger)
    }

    /// Whether any block has been accepted yet.
    pub fn has_genesis_block(&self) -> bool {
        self.latest_block.is_some()
    }

    /// The latest accepted block, if any.
    pub fn latest_block(&self) -> Option<&Block> {
        self.latest_block.as_ref()
    }

    /// Hash of the latest accepted block (zero before the first block).
    pub fn latest_block_hash(&self) -> BlockHash {
        self.latest_block_hash
    }

    /// Number of the latest accepted block (0 before the first block).
    pub fn latest_block_number(&self) -> u64 {
        self.latest_block
            .as_ref()
            .map(|b| b.header.number)
            .unwrap_or(0)
    }

    /// Height of the chain: `None` before the first accepted block.
    pub fn block_height(&self) -> Option<u64> {
        self.latest_block.as_ref().map(|b| b.header.number)
    }

    /// Number the next accepted block must carry.
    pub fn next_block_number(&self) -> u64 {
        match &self.latest_block {
            Some(block) => block.header.number + 1,
            None => 0,
        }
    }

    /// Current account balances.
    pub fn balances(&self) -> &HashMap<Address, u64> {
        &self.balances
    }

    /// Balance of a single account (0 if unknown).
    pub fn balance_of(&self, account: Address) -> u64 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// The nonce the account's next transaction must carry.
    pub fn next_account_nonce(&self, account: Address) -> u64 {
        self.account_nonces.get(&account).copied().unwrap_or(0) + 1
    }

    /// Validate and apply a block to the in-memory state.
    pub fn apply_block(&mut self, block: &Block) -> Result<BlockHash, StateError> {
        let prepared = self.prepare(block, true)?;
        let hash = prepared.hash;
        self.commit(block.clone(), prepared);
        Ok(hash)
    }

    /// Validate a block, persist it to the block log, then commit it.
    ///
    /// The record is appended only after full validation and before the
    /// in-memory commit, so a crash between the two is repaired by replay.
    pub fn add_block(&mut self, block: Block) -> Result<BlockHash, StateError> {
        let prepared = self.prepare(&block, true)?;
        self.log.append(&BlockRecord {
            hash: prepared.hash,
            block: block.clone(),
        })?;

        info!(
            number = block.header.number,
            hash = %prepared.hash,
            txs = block.txs.len(),
            "persisted new block"
        );

        let hash = prepared.hash;
        self.commit(block, prepared);
        Ok(hash)
    }

    /// All persisted blocks strictly after the given hash, in chain order.
    pub fn blocks_after(&self, from: BlockHash) -> Result<Vec<Block>, StateError> {
        self.log.blocks_after(from)
    }

    /// Run every validation step for a block and build the post-state on a
    /// scratch copy of the maps. Nothing is mutated.
    fn prepare(&self, block: &Block, verify_pow: bool) -> Result<PreparedBlock, StateError> {
        let expected = self.next_block_number();
        if block.header.number != expected {
            return Err(BlockError::NumberOutOfSequence {
                expected,
                got: block.header.number,
            }
            .into());
        }

        if self.has_genesis_block() && block.header.parent != self.latest_block_hash {
            return Err(BlockError::ParentMismatch {
                expected: self.latest_block_hash,
                got: block.header.parent,
            }
            .into());
        }

        let hash = block.hash();
        if verify_pow && !is_valid_block_hash(&hash) {
            return Err(BlockError::ProofOfWork(hash).into());
        }

        let mut balances = self.balances.clone();
        let mut account_nonces = self.account_nonces.clone();

        // Protocol order: ascending submission time, stable for ties
        let mut txs: Vec<&SignedTransaction> = block.txs.iter().collect();
        txs.sort_by_key(|tx| tx.tx.time);

        for tx in txs {
            Self::apply_transaction(tx, &mut balances, &mut account_nonces)?;
            debug!(hash = %tx.hash(), "applied transaction");
        }

        *balances.entry(block.header.miner).or_insert(0) += BLOCK_REWARD;

        Ok(PreparedBlock {
            hash,
            balances,
            account_nonces,
        })
    }

    /// Replace the maps and advance the chain head. Infallible by design:
    /// every check already ran in `prepare`.
    fn commit(&mut self, block: Block, prepared: PreparedBlock) {
        self.balances = prepared.balances;
        self.account_nonces = prepared.account_nonces;
        self.latest_block_hash = prepared.hash;
        self.latest_block = Some(block);
    }

    /// Apply one transaction to the scratch maps.
    ///
    /// Reward transactions credit the recipient unconditionally; this path is
    /// internal only, the node never admits them from the network.
    fn apply_transaction(
        tx: &SignedTransaction,
        balances: &mut HashMap<Address, u64>,
        account_nonces: &mut HashMap<Address, u64>,
    ) -> Result<(), TransactionError> {
        if tx.tx.is_reward() {
            *balances.entry(tx.tx.to).or_insert(0) += tx.tx.value;
            return Ok(());
        }

        tx.is_authentic()?;

        let expected = account_nonces.get(&tx.tx.from).copied().unwrap_or(0) + 1;
        if tx.tx.nonce != expected {
            return Err(TransactionError::Nonce {
                expected,
                got: tx.tx.nonce,
            });
        }

        let balance = balances.get(&tx.tx.from).copied().unwrap_or(0);
        if balance < tx.tx.value {
            return Err(TransactionError::InsufficientFunds {
                balance,
                needed: tx.tx.value,
            });
        }

        balances.insert(tx.tx.from, balance - tx.tx.value);
        *balances.entry(tx.tx.to).or_insert(0) += tx.tx.value;
        account_nonces.insert(tx.tx.from, tx.tx.nonce);
        Ok(())
    }

    /// Test seam: apply a block without the proof-of-work check, so state
    /// transitions can be exercised without a mining search.
    #[cfg(test)]
    pub(crate) fn apply_block_skipping_pow(
        &mut self,
        block: &Block,
    ) -> Result<BlockHash, StateError> {
        let prepared = self.prepare(block, false)?;
        let hash = prepared.hash;
        self.commit(block.clone(), prepared);
        Ok(hash)
    }
}
