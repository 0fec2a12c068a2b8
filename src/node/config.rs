//! Node configuration.

use super::peer::PeerNode;
use crate::types::Address;
use std::path::PathBuf;

/// Default listen IP for the HTTP API.
pub const DEFAULT_IP: &str = "127.0.0.1";

/// Default HTTP port, shared by the API and the sync protocol.
pub const DEFAULT_HTTP_PORT: u16 = 8086;

/// Everything a node needs to start: where its state lives, where it
/// listens, who gets its block rewards, and who to gossip with first.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Directory holding the genesis file, block log, and keystore
    pub data_dir: PathBuf,
    /// IP the HTTP API listens on
    pub ip: String,
    /// Port the HTTP API listens on
    pub port: u16,
    /// Account credited with this node's block rewards
    pub miner: Address,
    /// Bootstrap peer contacted on the first sync round, if any
    pub bootstrap: Option<PeerNode>,
}

impl NodeConfig {
    pub fn new(data_dir: PathBuf, ip: String, port: u16, miner: Address) -> Self {
        Self {
            data_dir,
            ip,
            port,
            miner,
            bootstrap: None,
        }
    }

    /// Set the bootstrap peer.
    pub fn with_bootstrap(mut self, peer: PeerNode) -> Self {
        self.bootstrap = Some(peer);
        self
    }

    /// Address the HTTP listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr() {
        let config = NodeConfig::new(
            PathBuf::from("/tmp/tc"),
            DEFAULT_IP.into(),
            DEFAULT_HTTP_PORT,
            Address::ZERO,
        );
        assert_eq!(config.listen_addr(), "127.0.0.1:8086");
        assert!(config.bootstrap.is_none());
    }

    #[test]
    fn test_with_bootstrap() {
        let bootstrap = PeerNode::new("10.0.0.2".into(), 9000, true, Address::ZERO, false);
        let config = NodeConfig::new(
            PathBuf::from("/tmp/tc"),
            DEFAULT_IP.into(),
            DEFAULT_HTTP_PORT,
            Address::ZERO,
        )
        .with_bootstrap(bootstrap.clone());
        assert_eq!(config.bootstrap, Some(bootstrap));
    }
}
