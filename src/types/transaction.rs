//! Transactions and their signed envelopes.
//!
//! A `Transaction` is a plain transfer intent; it becomes authoritative only
//! once wrapped in a `SignedTransaction` whose signature was produced over the
//! transaction's canonical JSON encoding. Field order in the structs below is
//! the wire order and must not change: the transaction hash is the SHA-256
//! digest of that exact encoding.

use super::{unix_now, Address};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The reason string marking an internally-minted reward transaction.
pub const REWARD_REASON: &str = "reward";

/// Recoverable ECDSA signature length: r || s || v
pub const SIGNATURE_LENGTH: usize = 65;

/// Transaction hash (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
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

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Serialize for TxHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TxHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A transfer intent between two accounts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Recipient account
    pub to: Address,
    /// Sender account
    pub from: Address,
    /// Sender's next nonce (strictly sequential per sender)
    pub nonce: u64,
    /// Amount to transfer
    pub value: u64,
    /// Empty for user transfers, `"reward"` for internally-minted credits
    pub reason: String,
    /// Unix timestamp at construction
    pub time: u64,
}

impl Transaction {
    /// Create a new transaction stamped with the current time.
    pub fn new(to: Address, from: Address, value: u64, nonce: u64, reason: String) -> Self {
        Self {
            to,
            from,
            nonce,
            value,
            reason,
            time: unix_now(),
        }
    }

    /// Whether this is a reward transaction (`reason == "reward"`).
    pub fn is_reward(&self) -> bool {
        self.reason == REWARD_REASON
    }

    /// SHA-256 digest of the canonical JSON encoding.
    ///
    /// Used both as the signing pre-hash and as the mempool key.
    pub fn hash(&self) -> TxHash {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        TxHash(Sha256::digest(&encoded).into())
    }
}

/// A transaction plus the signature that makes it authoritative.
///
/// On the wire the transaction fields are flattened next to the signature,
/// matching the persisted and gossiped JSON layout.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub tx: Transaction,
    /// Recoverable ECDSA signature over the transaction hash, hex encoded.
    #[serde(with = "sig_hex")]
    pub signature: [u8; SIGNATURE_LENGTH],
}

impl SignedTransaction {
    /// Create from a transaction and its signature.
    pub fn new(tx: Transaction, signature: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { tx, signature }
    }

    /// Hash of the underlying (unsigned) transaction.
    pub fn hash(&self) -> TxHash {
        self.tx.hash()
    }

    /// Verify that the signature recovers to the claimed sender.
    ///
    /// Fails with `TransactionError::Authentication` if recovery fails
    /// (malformed signature) or the recovered address differs from `from`.
    pub fn is_authentic(&self) -> Result<(), TransactionError> {
        let recovered = crate::wallet::recover_signer(&self.tx.hash(), &self.signature)
            .map_err(|_| TransactionError::Authentication)?;
        if recovered == self.tx.from {
            Ok(())
        } else {
            Err(TransactionError::Authentication)
        }
    }
}

/// Hex serde for the 65-byte signature.
mod sig_hex {
    use super::SIGNATURE_LENGTH;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(sig: &[u8; SIGNATURE_LENGTH], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(sig))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; SIGNATURE_LENGTH], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "signature must be {SIGNATURE_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; SIGNATURE_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

/// Transaction-level validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("signature does not recover to the claimed sender")]
    Authentication,

    #[error("invalid nonce: expected {expected}, got {got}")]
    Nonce { expected: u64, got: u64 },

    #[error("insufficient funds: balance {balance}, needed {needed}")]
    InsufficientFunds { balance: u64, needed: u64 },

    #[error("reward transactions cannot be submitted")]
    RewardNotAllowed,
}
