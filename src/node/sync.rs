//! The pull-gossip synchronization client.
//!
//! Every sync round the node asks each known peer for its status, joins it
//! if not yet mutually connected, pulls any blocks it is missing, merges the
//! peer's peer set, and adopts the peer's pending transactions. Every step's
//! failure is logged and independent: one bad peer never blocks the rest of
//! the round, and an unreachable peer is dropped from the registry (it can
//! rejoin later through peer exchange).

use super::http::{AddPeerRes, StatusRes, SyncRes, ADD_PEER_ENDPOINT, STATUS_ENDPOINT, SYNC_ENDPOINT};
use super::{Node, NodeStatus, PeerNode, SYNC_INTERVAL};
use crate::state::StateError;
use reqwest::Client;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Per-request timeout; a stalled peer must not hold up the round for the
/// others longer than this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sync-protocol errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer reported error: {0}")]
    Remote(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Periodic sync task, one per node.
pub async fn run(node: Node) {
    let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "could not build sync HTTP client");
            return;
        }
    };

    let mut ticker = tokio::time::interval(SYNC_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if node.status() == NodeStatus::ShuttingDown {
            return;
        }
        sync_round(&node, &client).await;
    }
}

/// One pass over the known-peer snapshot.
async fn sync_round(node: &Node, client: &Client) {
    for peer in node.known_peers().into_values() {
        if peer.ip == node.info().ip && peer.port == node.info().port {
            continue;
        }

        debug!(peer = %peer.tcp_address(), "polling peer for blocks and peers");

        let status = match query_peer_status(client, &peer).await {
            Ok(status) => status,
            Err(e) => {
                // Unreachable peers are assumed gone; they may rejoin later
                warn!(peer = %peer.tcp_address(), error = %e, "peer unreachable, removing");
                node.remove_peer(&peer);
                continue;
            }
        };

        if let Err(e) = join_known_peers(node, client, &peer).await {
            warn!(peer = %peer.tcp_address(), error = %e, "join handshake failed");
            continue;
        }

        if let Err(e) = sync_blocks(node, client, &peer, &status).await {
            if let SyncError::State(StateError::Io(_)) = &e {
                error!(error = %e, "block log write failed, shutting down");
                node.shutdown();
                return;
            }
            warn!(peer = %peer.tcp_address(), error = %e, "block sync aborted");
            continue;
        }

        sync_known_peers(node, &status);
        sync_pending_txs(node, &peer, status.pending_txs);
    }
}

/// Step 1: fetch the peer's status (head, peer set, pending transactions).
async fn query_peer_status(client: &Client, peer: &PeerNode) -> Result<StatusRes, SyncError> {
    let url = format!("{}{}", peer.base_url(), STATUS_ENDPOINT);
    let status = client.get(url).send().await?.json::<StatusRes>().await?;
    Ok(status)
}

/// Step 2: announce ourselves to the peer unless already mutually connected.
async fn join_known_peers(node: &Node, client: &Client, peer: &PeerNode) -> Result<(), SyncError> {
    if peer.connected {
        return Ok(());
    }

    let url = format!(
        "{}{}?ip={}&port={}&miner={}",
        peer.base_url(),
        ADD_PEER_ENDPOINT,
        node.info().ip,
        node.info().port,
        node.info().account,
    );

    let res = client.get(url).send().await?.json::<AddPeerRes>().await?;
    if !res.error.is_empty() {
        return Err(SyncError::Remote(res.error));
    }

    node.mark_peer_connected(&peer.key(), res.success);
    if !res.success {
        return Err(SyncError::Remote(format!(
            "unable to join known peers of '{}'",
            peer.tcp_address()
        )));
    }

    info!(peer = %peer.tcp_address(), "joined peer");
    Ok(())
}

/// Step 3: pull and apply any blocks the peer has beyond our head.
///
/// Blocks apply strictly in order; the first invalid block aborts the rest
/// of this peer's range for the round.
async fn sync_blocks(
    node: &Node,
    client: &Client,
    peer: &PeerNode,
    status: &StatusRes,
) -> Result<(), SyncError> {
    let peer_ahead = match node.block_height() {
        // A fresh node adopts anything a peer has
        None => !status.block_hash.is_zero(),
        Some(height) => status.block_number > height,
    };
    if !peer_ahead {
        return Ok(());
    }

    info!(
        peer = %peer.tcp_address(),
        local = node.latest_block_number(),
        remote = status.block_number,
        "peer is ahead, importing blocks"
    );

    let blocks = fetch_blocks_from_peer(client, peer, node.latest_block_hash()).await?;
    for block in blocks {
        node.apply_synced_block(block)?;
    }
    Ok(())
}

async fn fetch_blocks_from_peer(
    client: &Client,
    peer: &PeerNode,
    from: crate::types::BlockHash,
) -> Result<Vec<crate::types::Block>, SyncError> {
    let url = format!(
        "{}{}?fromBlock={}",
        peer.base_url(),
        SYNC_ENDPOINT,
        from.to_hex(),
    );
    let res = client.get(url).send().await?.json::<SyncRes>().await?;
    Ok(res.blocks)
}

/// Step 4: adopt peers of the peer that we have not seen yet.
fn sync_known_peers(node: &Node, status: &StatusRes) {
    for other in status.peers_known.values() {
        if !node.is_known_peer(other) {
            info!(peer = %other.tcp_address(), "discovered new peer");
            node.add_peer(other.clone());
        }
    }
}

/// Step 5: adopt the peer's pending transactions into our own mempool.
fn sync_pending_txs(node: &Node, peer: &PeerNode, txs: Vec<crate::types::SignedTransaction>) {
    for tx in txs {
        match node.submit_pending_tx(tx, peer) {
            Ok(_) => {}
            Err(e) => debug!(peer = %peer.tcp_address(), error = %e, "rejected gossiped transaction"),
        }
    }
}
