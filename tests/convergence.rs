//! End-to-end tests: the HTTP API surface and two-node convergence.
//!
//! The convergence test performs a real proof-of-work search (about 2^24
//! hash attempts at the fixed difficulty), so it is ignored by default:
//!
//! ```bash
//! cargo test --test convergence -- --ignored
//! ```

use k256::ecdsa::SigningKey;
use rand_core::OsRng;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tinychain::node::http::{BalancesRes, StatusRes, SyncRes, TxAddRes};
use tinychain::node::PeerNode;
use tinychain::state::init_data_dir;
use tinychain::types::{Address, BlockHash, Transaction};
use tinychain::wallet::{derive_address, sign_tx};
use tinychain::{Node, NodeConfig};
use tokio::sync::oneshot;

const GENESIS_BALANCE: u64 = 1_000_000;

fn genesis_for(account: Address) -> String {
    format!(
        r#"{{"genesis_time":"t","chain_id":"tinychain-test","balances":{{"{account}":{GENESIS_BALANCE}}}}}"#,
    )
}

fn node_on_port(data_dir: &Path, port: u16, miner: Address) -> Node {
    let config = NodeConfig::new(data_dir.to_path_buf(), "127.0.0.1".into(), port, miner);
    Node::new(config).unwrap()
}

/// Run a node in the background; the returned sender stops it.
fn spawn_node(node: Node) -> oneshot::Sender<()> {
    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(node.run_until(async {
        let _ = stop_rx.await;
    }));
    stop_tx
}

async fn wait_until_reachable(client: &reqwest::Client, port: u16) {
    let url = format!("http://127.0.0.1:{port}/node/status");
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if client.get(&url).send().await.is_ok() {
            return;
        }
        assert!(Instant::now() < deadline, "node on port {port} never came up");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn test_http_api_surface() {
    let dir = tempfile::tempdir().unwrap();
    let port = 28601;

    // Fund a keystore account so /tx/add can sign for it
    let password = "integration";
    let account = tinychain::wallet::create_account(dir.path(), password).unwrap();
    init_data_dir(dir.path(), &genesis_for(account)).unwrap();

    let node = node_on_port(dir.path(), port, Address::ZERO);
    let stop = spawn_node(node);

    let client = reqwest::Client::new();
    wait_until_reachable(&client, port).await;
    let base = format!("http://127.0.0.1:{port}");

    // Fresh chain: zero head, genesis balances
    let status: StatusRes = client
        .get(format!("{base}/node/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.block_hash.is_zero());
    assert_eq!(status.block_number, 0);
    assert!(status.pending_txs.is_empty());

    let balances: BalancesRes = client
        .get(format!("{base}/balances/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balances.balances.get(&account), Some(&GENESIS_BALANCE));

    // Sync from the zero hash on an empty chain yields no blocks
    let sync: SyncRes = client
        .get(format!(
            "{base}/node/sync?fromBlock={}",
            BlockHash::ZERO.to_hex()
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(sync.blocks.is_empty());

    // Peer registration shows up in the status peer map
    let res = client
        .get(format!(
            "{base}/node/peer?ip=127.0.0.1&port=28699&miner={account}"
        ))
        .send()
        .await
        .unwrap()
        .json::<HashMap<String, serde_json::Value>>()
        .await
        .unwrap();
    assert_eq!(res["success"], serde_json::Value::Bool(true));

    let status: StatusRes = client
        .get(format!("{base}/node/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(status.peers_known.contains_key("127.0.0.1:28699"));

    // Submit a transfer through the keystore-backed endpoint
    let add: TxAddRes = client
        .post(format!("{base}/tx/add"))
        .json(&serde_json::json!({
            "to": "0x0000000000000000000000000000000000000001",
            "from": account.to_hex(),
            "from_pwd": password,
            "value": 10,
            "reason": "",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(add.success);

    let status: StatusRes = client
        .get(format!("{base}/node/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status.pending_txs.len(), 1);
    assert_eq!(status.pending_txs[0].tx.value, 10);

    // Reward transactions are refused at the API boundary
    let res = client
        .post(format!("{base}/tx/add"))
        .json(&serde_json::json!({
            "to": account.to_hex(),
            "from": account.to_hex(),
            "from_pwd": password,
            "value": 1000,
            "reason": "reward",
        }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_server_error());

    let _ = stop.send(());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "performs a real proof-of-work search; minutes of CPU"]
async fn test_two_nodes_converge() {
    let dir_x = tempfile::tempdir().unwrap();
    let dir_y = tempfile::tempdir().unwrap();
    let (port_x, port_y) = (28611, 28612);

    let key = SigningKey::random(&mut OsRng);
    let alice = derive_address(key.verifying_key());
    let miner = Address::from_bytes([0x11; 20]);

    // Both nodes start from the same genesis
    init_data_dir(dir_x.path(), &genesis_for(alice)).unwrap();
    init_data_dir(dir_y.path(), &genesis_for(alice)).unwrap();

    let node_x = node_on_port(dir_x.path(), port_x, miner);
    let node_y = {
        let config = NodeConfig::new(
            dir_y.path().to_path_buf(),
            "127.0.0.1".into(),
            port_y,
            Address::ZERO,
        )
        .with_bootstrap(PeerNode::new(
            "127.0.0.1".into(),
            port_x,
            true,
            miner,
            false,
        ));
        Node::new(config).unwrap()
    };

    let stop_x = spawn_node(node_x.clone());
    let stop_y = spawn_node(node_y.clone());

    // Give node X a transaction to mine
    let tx = Transaction::new(Address::from_bytes([0xB0; 20]), alice, 50, 1, String::new());
    let signed = sign_tx(tx, &key).unwrap();
    let origin = node_x.info().clone();
    node_x.submit_pending_tx(signed, &origin).unwrap();

    // X mines block 0, Y pulls it over sync; wait for both heads to agree
    let deadline = Instant::now() + Duration::from_secs(600);
    loop {
        let x_height = node_x.block_height();
        let y_height = node_y.block_height();
        if x_height == Some(0)
            && y_height == Some(0)
            && node_x.latest_block_hash() == node_y.latest_block_hash()
        {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "nodes did not converge: x={x_height:?} y={y_height:?}"
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    // Identical ledgers on both sides
    assert_eq!(node_x.balances(), node_y.balances());
    assert_eq!(node_x.balances()[&alice], GENESIS_BALANCE - 50);
    assert_eq!(
        node_x.balances()[&miner],
        tinychain::types::BLOCK_REWARD
    );

    // The mined transaction is archived, not pending, on both nodes
    assert!(node_x.pending_txs().is_empty());
    assert!(node_y.pending_txs().is_empty());

    let _ = stop_x.send(());
    let _ = stop_y.send(());
}
