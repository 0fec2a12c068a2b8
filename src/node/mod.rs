//! The node coordinator.
//!
//! One `Node` per process. It owns the ledger, the pending/archived
//! transaction maps, and the known-peer registry; the HTTP handlers and the
//! sync client never touch those directly, they call the operations here,
//! which serialize access. Three periodic tasks share the node: the sync
//! loop, the mining trigger, and the mining search itself (spawned fresh on
//! each trigger).

pub mod config;
pub mod http;
pub mod peer;
pub mod sync;

pub use config::NodeConfig;
pub use peer::{PeerKey, PeerNode};

use crate::miner::{self, CancelHandle, MineError, PendingBlock};
use crate::state::{init_data_dir, Ledger, StateError, DEFAULT_GENESIS_JSON};
use crate::types::{
    Address, Block, BlockHash, SignedTransaction, TransactionError, TxHash,
};
use crate::{ChainError, ChainResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How often the mining trigger checks the mempool.
pub const MINING_INTERVAL: Duration = Duration::from_secs(10);

/// How often the sync client polls known peers.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// No mining search in flight
    Idle,
    /// Exactly one mining search in flight
    Mining,
    /// Terminal: no further searches are started
    ShuttingDown,
}

/// Cheaply cloneable handle to the single node instance.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    config: NodeConfig,
    info: PeerNode,
    /// Block application is a critical section: it appends to the durable
    /// log and swaps the in-memory maps, and must never interleave.
    ledger: Mutex<Ledger>,
    pending_txs: RwLock<HashMap<TxHash, SignedTransaction>>,
    archived_txs: RwLock<HashMap<TxHash, SignedTransaction>>,
    known_peers: RwLock<HashMap<PeerKey, PeerNode>>,
    status: Mutex<NodeStatus>,
    mining_cancel: Mutex<Option<CancelHandle>>,
    wake_miner: Notify,
    /// Fired by `shutdown` so the HTTP server stops serving too
    shutdown_signal: Notify,
}

impl Node {
    /// Initialize the data directory if needed and rebuild the ledger.
    pub fn new(config: NodeConfig) -> ChainResult<Self> {
        init_data_dir(&config.data_dir, DEFAULT_GENESIS_JSON)?;
        let ledger = Ledger::from_disk(&config.data_dir)?;

        let info = PeerNode::new(
            config.ip.clone(),
            config.port,
            false,
            config.miner,
            true,
        );

        let mut known_peers = HashMap::new();
        if let Some(bootstrap) = &config.bootstrap {
            if bootstrap.key() != info.key() {
                known_peers.insert(bootstrap.key(), bootstrap.clone());
            }
        }

        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                info,
                ledger: Mutex::new(ledger),
                pending_txs: RwLock::new(HashMap::new()),
                archived_txs: RwLock::new(HashMap::new()),
                known_peers: RwLock::new(known_peers),
                status: Mutex::new(NodeStatus::Idle),
                mining_cancel: Mutex::new(None),
                wake_miner: Notify::new(),
                shutdown_signal: Notify::new(),
            }),
        })
    }

    /// This node's own peer identity.
    pub fn info(&self) -> &PeerNode {
        &self.inner.info
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn status(&self) -> NodeStatus {
        *self.inner.status.lock()
    }

    // ------------------------------------------------------------------
    // Ledger views
    // ------------------------------------------------------------------

    pub fn latest_block_hash(&self) -> BlockHash {
        self.inner.ledger.lock().latest_block_hash()
    }

    /// Latest block number, 0 before the first block (wire convention).
    pub fn latest_block_number(&self) -> u64 {
        self.inner.ledger.lock().latest_block_number()
    }

    /// Chain height, `None` before the first accepted block.
    pub fn block_height(&self) -> Option<u64> {
        self.inner.ledger.lock().block_height()
    }

    pub fn balances(&self) -> HashMap<Address, u64> {
        self.inner.ledger.lock().balances().clone()
    }

    pub fn next_account_nonce(&self, account: Address) -> u64 {
        self.inner.ledger.lock().next_account_nonce(account)
    }

    pub fn blocks_after(&self, from: BlockHash) -> Result<Vec<Block>, StateError> {
        self.inner.ledger.lock().blocks_after(from)
    }

    // ------------------------------------------------------------------
    // Peer registry
    // ------------------------------------------------------------------

    /// Snapshot of the known-peer set.
    pub fn known_peers(&self) -> HashMap<PeerKey, PeerNode> {
        self.inner.known_peers.read().clone()
    }

    /// Whether the peer is already known. This node counts as known to itself.
    pub fn is_known_peer(&self, peer: &PeerNode) -> bool {
        if peer.ip == self.inner.info.ip && peer.port == self.inner.info.port {
            return true;
        }
        self.inner.known_peers.read().contains_key(&peer.key())
    }

    pub fn add_peer(&self, peer: PeerNode) {
        info!(peer = %peer.tcp_address(), "added peer");
        self.inner.known_peers.write().insert(peer.key(), peer);
    }

    pub fn remove_peer(&self, peer: &PeerNode) {
        info!(peer = %peer.tcp_address(), "removed peer");
        self.inner.known_peers.write().remove(&peer.key());
    }

    /// Record the outcome of a join handshake with a peer.
    pub(crate) fn mark_peer_connected(&self, key: &PeerKey, connected: bool) {
        if let Some(peer) = self.inner.known_peers.write().get_mut(key) {
            peer.connected = connected;
        }
    }

    // ------------------------------------------------------------------
    // Mempool
    // ------------------------------------------------------------------

    /// Admit a transaction into the mempool.
    ///
    /// Idempotent: a hash already pending or already archived is a silent
    /// no-op (`Ok(false)`), which is the node's replay defense on top of the
    /// ledger's nonce check. Reward transactions are never accepted from
    /// outside the mining routine, and the signature must recover to the
    /// claimed sender before the transaction takes up pool space.
    pub fn submit_pending_tx(
        &self,
        tx: SignedTransaction,
        origin: &PeerNode,
    ) -> Result<bool, TransactionError> {
        if tx.tx.is_reward() {
            return Err(TransactionError::RewardNotAllowed);
        }
        tx.is_authentic()?;

        let hash = tx.hash();
        if self.inner.pending_txs.read().contains_key(&hash)
            || self.inner.archived_txs.read().contains_key(&hash)
        {
            return Ok(false);
        }

        info!(hash = %hash, origin = %origin.tcp_address(), "added pending transaction");
        self.inner.pending_txs.write().insert(hash, tx);
        self.inner.wake_miner.notify_one();
        Ok(true)
    }

    /// Snapshot of the pending transactions.
    pub fn pending_txs(&self) -> Vec<SignedTransaction> {
        self.inner.pending_txs.read().values().cloned().collect()
    }

    /// Move every transaction in a mined block out of the mempool and into
    /// the archive, whether it was mined here or by a peer.
    fn archive_mined_txs(&self, block: &Block) {
        let mut pending = self.inner.pending_txs.write();
        let mut archived = self.inner.archived_txs.write();
        for tx in &block.txs {
            let hash = tx.hash();
            if pending.remove(&hash).is_some() {
                debug!(hash = %hash, "archiving mined transaction");
            }
            archived.insert(hash, tx.clone());
        }
    }

    // ------------------------------------------------------------------
    // Consensus flow
    // ------------------------------------------------------------------

    /// Apply a block fetched from a peer.
    ///
    /// On success the block's transactions are archived out of the local
    /// mempool and any in-flight mining search is cancelled: a peer already
    /// mined these transactions, continuing would waste work.
    pub fn apply_synced_block(&self, block: Block) -> Result<BlockHash, StateError> {
        let hash = self.inner.ledger.lock().add_block(block.clone())?;

        info!(hash = %hash, number = block.header.number, "applied synced block");
        self.archive_mined_txs(&block);
        self.interrupt_mining();
        Ok(hash)
    }

    /// Request cancellation of the in-flight search, if any. Safe to call
    /// repeatedly and from any task.
    pub fn cancel_mining(&self) {
        if let Some(cancel) = self.inner.mining_cancel.lock().as_ref() {
            cancel.cancel();
        }
    }

    /// Cancel mining and return the state machine to `Idle`. The cancelling
    /// caller owns the transition so the node can never be stuck in `Mining`.
    fn interrupt_mining(&self) {
        self.cancel_mining();
        let mut status = self.inner.status.lock();
        if *status == NodeStatus::Mining {
            *status = NodeStatus::Idle;
        }
    }

    /// One trigger evaluation: start a search if the mempool is non-empty
    /// and no search is in flight.
    async fn try_mine(&self) {
        let pending_block = {
            let ledger = self.inner.ledger.lock();
            let pending: Vec<SignedTransaction> =
                self.inner.pending_txs.read().values().cloned().collect();
            let mut status = self.inner.status.lock();

            if *status != NodeStatus::Idle || pending.is_empty() {
                return;
            }

            *status = NodeStatus::Mining;
            PendingBlock::new(
                ledger.latest_block_hash(),
                ledger.next_block_number(),
                self.inner.info.account,
                pending,
            )
        };

        info!(
            number = pending_block.number,
            txs = pending_block.txs.len(),
            "starting mining search"
        );

        let cancel = CancelHandle::new();
        *self.inner.mining_cancel.lock() = Some(cancel.clone());

        let search = {
            let pending_block = pending_block.clone();
            tokio::task::spawn_blocking(move || miner::mine(&pending_block, &cancel))
        };
        let result = search.await;

        *self.inner.mining_cancel.lock() = None;

        match result {
            Ok(Ok(block)) => {
                let applied = self.inner.ledger.lock().add_block(block.clone());
                match applied {
                    Ok(hash) => {
                        info!(hash = %hash, "mined block accepted");
                        self.archive_mined_txs(&block);
                    }
                    Err(e @ StateError::Io(_)) => {
                        // State durability is gone; the node cannot continue
                        error!(error = %e, "block log write failed, shutting down");
                        self.shutdown();
                    }
                    // A synced block can win the race between our search
                    // finishing and the ledger lock; the pending txs stay in
                    // the pool for the next trigger.
                    Err(e) => warn!(error = %e, "locally mined block rejected"),
                }
            }
            Ok(Err(MineError::Cancelled)) => {
                debug!("mining search cancelled");
            }
            Ok(Err(MineError::NoTransactions)) => {}
            Err(e) => warn!(error = %e, "mining task panicked"),
        }

        // Cancellation paths already moved the status; only an untouched
        // `Mining` returns to `Idle` here.
        let mut status = self.inner.status.lock();
        if *status == NodeStatus::Mining {
            *status = NodeStatus::Idle;
        }
    }

    /// Periodic mining trigger. Also woken early by new pending transactions.
    async fn mining_trigger_loop(self) {
        let mut ticker = tokio::time::interval(MINING_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.inner.wake_miner.notified() => {}
            }

            if self.status() == NodeStatus::ShuttingDown {
                return;
            }
            self.try_mine().await;
        }
    }

    /// Move to `ShuttingDown`, cancel any in-flight search, and stop serving.
    pub fn shutdown(&self) {
        info!("node shutting down");
        {
            let mut status = self.inner.status.lock();
            *status = NodeStatus::ShuttingDown;
        }
        self.cancel_mining();
        self.inner.shutdown_signal.notify_one();
    }

    /// Serve the HTTP API and run the sync and mining loops until the given
    /// future resolves, then shut down gracefully.
    pub async fn run_until<F>(self, shutdown: F) -> ChainResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %self.inner.config.listen_addr(),
            miner = %self.inner.info.account,
            height = self.latest_block_number(),
            hash = %self.latest_block_hash(),
            "starting node"
        );

        let listener = tokio::net::TcpListener::bind(self.inner.config.listen_addr()).await?;

        let sync_task = tokio::spawn(sync::run(self.clone()));
        let mine_task = tokio::spawn(self.clone().mining_trigger_loop());

        // Stop serving on the caller's future or on an internal shutdown
        // (fatal block-log failure)
        let inner = self.inner.clone();
        let stop = async move {
            tokio::select! {
                _ = shutdown => {}
                _ = inner.shutdown_signal.notified() => {}
            }
        };

        let app = http::router(self.clone());
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(stop)
            .await;

        self.shutdown();
        sync_task.abort();
        mine_task.abort();

        served.map_err(ChainError::Io)
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> ChainResult<()> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }
}
