//! Blocks, block headers, and the proof-of-work acceptance predicate.

use super::{Address, SignedTransaction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Amount credited to a block's miner on acceptance.
pub const BLOCK_REWARD: u64 = 100;

/// Block hash (32 bytes). The all-zero value denotes "no parent".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Zero hash (genesis-successor parent)
    pub const ZERO: Self = Self([0u8; 32]);

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Proof-of-work acceptance predicate.
///
/// A block hash is valid when its first three bytes are zero and the fourth
/// is non-zero. The difficulty is fixed and intentionally non-adjustable:
/// this is a teaching-scale network, not a production consensus protocol.
pub fn is_valid_block_hash(hash: &BlockHash) -> bool {
    let h = hash.as_bytes();
    h[0] == 0 && h[1] == 0 && h[2] == 0 && h[3] != 0
}

/// Block header: chain linkage plus the proof-of-work search variable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Hash of the parent block (zero for the genesis-successor)
    pub parent: BlockHash,
    /// Block position in the chain, starting at 0
    pub number: u64,
    /// Proof-of-work search variable
    pub nonce: u32,
    /// Unix timestamp at construction
    pub time: u64,
    /// Account credited with the block reward
    pub miner: Address,
}

/// A header plus an ordered sequence of signed transactions.
///
/// The hash is the SHA-256 digest of the canonical JSON encoding of the whole
/// block, which is also the proof-of-work target.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(rename = "payload")]
    pub txs: Vec<SignedTransaction>,
}

impl Block {
    /// Create a new block.
    pub fn new(
        parent: BlockHash,
        number: u64,
        nonce: u32,
        time: u64,
        miner: Address,
        txs: Vec<SignedTransaction>,
    ) -> Self {
        Self {
            header: BlockHeader {
                parent,
                number,
                nonce,
                time,
                miner,
            },
            txs,
        }
    }

    /// SHA-256 digest of the canonical JSON encoding (header + payload).
    pub fn hash(&self) -> BlockHash {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        BlockHash(Sha256::digest(&encoded).into())
    }
}

/// Block-level validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("block number {got} does not follow chain head: expected {expected}")]
    NumberOutOfSequence { expected: u64, got: u64 },

    #[error("block parent {got} does not match chain head {expected}")]
    ParentMismatch { expected: BlockHash, got: BlockHash },

    #[error("block hash {0} does not satisfy the proof-of-work difficulty")]
    ProofOfWork(BlockHash),
}
