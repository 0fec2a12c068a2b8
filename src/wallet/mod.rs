//! Wallet: recoverable ECDSA signing over secp256k1 and the encrypted keystore.
//!
//! Signatures are 65 bytes (`r || s || v`); the signer's address is recovered
//! from the transaction hash and the signature alone, so transactions carry no
//! public key. Addresses are the last 20 bytes of the Keccak-256 digest of the
//! uncompressed public key.

pub mod keystore;

pub use keystore::{create_account, keystore_dir, sign_with_keystore_account};

use crate::types::{Address, SignedTransaction, Transaction, TxHash, SIGNATURE_LENGTH};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

/// Derive the account address for a public key.
///
/// Address = Keccak-256(uncompressed point without the 0x04 tag)[12..32]
pub fn derive_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address::from_bytes(bytes)
}

/// Sign a transaction, producing its authoritative signed envelope.
pub fn sign_tx(tx: Transaction, key: &SigningKey) -> Result<SignedTransaction, WalletError> {
    let hash = tx.hash();
    let (sig, recid) = key
        .sign_prehash_recoverable(hash.as_bytes())
        .map_err(|e| WalletError::Signing(e.to_string()))?;

    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes[..64].copy_from_slice(&sig.to_bytes());
    bytes[64] = recid.to_byte();
    Ok(SignedTransaction::new(tx, bytes))
}

/// Recover the signing address from a transaction hash and signature.
///
/// Fails on malformed signatures or unrecoverable points.
pub fn recover_signer(
    hash: &TxHash,
    signature: &[u8; SIGNATURE_LENGTH],
) -> Result<Address, WalletError> {
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| WalletError::MalformedSignature(e.to_string()))?;
    let recid = RecoveryId::from_byte(signature[64])
        .ok_or_else(|| WalletError::MalformedSignature("invalid recovery id".into()))?;

    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recid)
        .map_err(|e| WalletError::Recovery(e.to_string()))?;
    Ok(derive_address(&key))
}

/// Wallet and keystore errors
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signer recovery failed: {0}")]
    Recovery(String),

    #[error("keystore I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("no keystore entry for account {0}")]
    UnknownAccount(Address),

    #[error("keystore decryption failed: wrong password or corrupt file")]
    Decryption,

    #[error("corrupt keystore file: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use rand_core::OsRng;

    fn test_tx(from: Address) -> Transaction {
        Transaction::new(Address::from_bytes([2; 20]), from, 10, 1, String::new())
    }

    #[test]
    fn test_sign_and_recover() {
        let key = SigningKey::random(&mut OsRng);
        let from = derive_address(key.verifying_key());

        let signed = sign_tx(test_tx(from), &key).unwrap();
        let recovered = recover_signer(&signed.hash(), &signed.signature).unwrap();

        assert_eq!(recovered, from);
        assert!(signed.is_authentic().is_ok());
    }

    #[test]
    fn test_authenticity_fails_for_wrong_sender() {
        let key = SigningKey::random(&mut OsRng);
        let claimed = Address::from_bytes([0xEE; 20]);

        // Signed by `key` but claiming a different sender
        let signed = sign_tx(test_tx(claimed), &key).unwrap();
        assert!(signed.is_authentic().is_err());
    }

    #[test]
    fn test_authenticity_fails_for_tampered_tx() {
        let key = SigningKey::random(&mut OsRng);
        let from = derive_address(key.verifying_key());

        let mut signed = sign_tx(test_tx(from), &key).unwrap();
        signed.tx.value = 9999;
        assert!(signed.is_authentic().is_err());
    }

    #[test]
    fn test_recover_rejects_garbage_signature() {
        let key = SigningKey::random(&mut OsRng);
        let from = derive_address(key.verifying_key());
        let tx = test_tx(from);

        // All-zero r/s is not a valid signature
        assert!(recover_signer(&tx.hash(), &[0u8; SIGNATURE_LENGTH]).is_err());
    }

    #[test]
    fn test_address_derivation_is_stable() {
        let key = SigningKey::random(&mut OsRng);
        let a = derive_address(key.verifying_key());
        let b = derive_address(key.verifying_key());
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }
}
