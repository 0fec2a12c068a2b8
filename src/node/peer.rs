//! Peer identity and registry types.

use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Structured peer-set key. Formatting as `ip:port` is for wire/display only.
pub type PeerKey = (String, u16);

/// A known peer of this node.
///
/// `connected` tracks whether the join handshake completed this session; it
/// is transient and never serialized.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerNode {
    pub ip: String,
    pub port: u16,
    pub is_bootstrap: bool,
    pub account: Address,
    #[serde(skip)]
    pub connected: bool,
}

impl PeerNode {
    pub fn new(ip: String, port: u16, is_bootstrap: bool, account: Address, connected: bool) -> Self {
        Self {
            ip,
            port,
            is_bootstrap,
            account,
            connected,
        }
    }

    /// Registry key for this peer.
    pub fn key(&self) -> PeerKey {
        (self.ip.clone(), self.port)
    }

    /// Wire/display address, `ip:port`.
    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Base URL for HTTP requests to this peer.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}
