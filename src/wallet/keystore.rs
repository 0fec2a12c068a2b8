//! Encrypted on-disk keystore.
//!
//! One file per account under `<data_dir>/keystore/`, named by the account's
//! hex address. Keys are encrypted with XChaCha20-Poly1305 under an Argon2id
//! password-derived key.
//!
//! File format: `[4B magic][1B version][32B salt][24B nonce][ciphertext+16B tag]`

use super::{derive_address, sign_tx, WalletError};
use crate::types::{Address, SignedTransaction, Transaction};
use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305,
};
use k256::ecdsa::SigningKey;
use rand_core::{OsRng, RngCore};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

/// Magic bytes identifying a tinychain keystore file.
const KEYSTORE_MAGIC: &[u8; 4] = b"TCKS";

/// Current keystore file format version.
const KEYSTORE_VERSION: u8 = 1;

/// Argon2id salt length in bytes.
const SALT_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce length in bytes.
const NONCE_LEN: usize = 24;

/// Keystore directory under the node data dir.
pub fn keystore_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("keystore")
}

fn key_file_path(keystore: &Path, account: Address) -> PathBuf {
    keystore.join(hex::encode(account.as_bytes()))
}

/// Derives a 32-byte encryption key from a password and salt using Argon2id.
fn derive_cipher_key(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password, salt, key.as_mut())
        .map_err(|e| WalletError::Corrupt(format!("argon2 key derivation failed: {e}")))?;
    Ok(key)
}

/// Generate a new account and persist its encrypted key.
///
/// Returns the new account's address.
pub fn create_account(data_dir: &Path, password: &str) -> Result<Address, WalletError> {
    let key = SigningKey::random(&mut OsRng);
    let account = derive_address(key.verifying_key());

    let dir = keystore_dir(data_dir);
    fs::create_dir_all(&dir)?;
    save_encrypted_key(&key, &key_file_path(&dir, account), password.as_bytes())?;

    info!(account = %account, "created keystore account");
    Ok(account)
}

/// Sign a transaction with a keystore account, decrypting its key with the
/// given password.
pub fn sign_with_keystore_account(
    tx: Transaction,
    account: Address,
    password: &str,
    keystore: &Path,
) -> Result<SignedTransaction, WalletError> {
    let path = key_file_path(keystore, account);
    if !path.exists() {
        return Err(WalletError::UnknownAccount(account));
    }

    let key = load_encrypted_key(&path, password.as_bytes())?;
    sign_tx(tx, &key)
}

fn save_encrypted_key(key: &SigningKey, path: &Path, password: &[u8]) -> Result<(), WalletError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let derived = derive_cipher_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new(derived.as_ref().into());

    let plaintext = Zeroizing::new(key.to_bytes());
    let ciphertext = cipher
        .encrypt(nonce.as_ref().into(), plaintext.as_slice())
        .map_err(|e| WalletError::Corrupt(format!("encryption failed: {e}")))?;

    let mut data = Vec::with_capacity(4 + 1 + SALT_LEN + NONCE_LEN + ciphertext.len());
    data.extend_from_slice(KEYSTORE_MAGIC);
    data.push(KEYSTORE_VERSION);
    data.extend_from_slice(&salt);
    data.extend_from_slice(&nonce);
    data.extend_from_slice(&ciphertext);

    fs::write(path, &data)?;
    Ok(())
}

fn load_encrypted_key(path: &Path, password: &[u8]) -> Result<SigningKey, WalletError> {
    let data = fs::read(path)?;

    const HEADER_LEN: usize = 4 + 1 + SALT_LEN + NONCE_LEN;
    if data.len() < HEADER_LEN + 16 {
        return Err(WalletError::Corrupt("keystore file too short".into()));
    }
    if &data[0..4] != KEYSTORE_MAGIC {
        return Err(WalletError::Corrupt("invalid keystore file magic".into()));
    }
    if data[4] != KEYSTORE_VERSION {
        return Err(WalletError::Corrupt(format!(
            "unsupported keystore file version: {}",
            data[4]
        )));
    }

    let salt = &data[5..5 + SALT_LEN];
    let nonce = &data[5 + SALT_LEN..5 + SALT_LEN + NONCE_LEN];
    let ciphertext = &data[HEADER_LEN..];

    let derived = derive_cipher_key(password, salt)?;
    let cipher = XChaCha20Poly1305::new(derived.as_ref().into());

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| WalletError::Decryption)?,
    );

    SigningKey::from_slice(&plaintext)
        .map_err(|_| WalletError::Corrupt("decrypted bytes are not a valid private key".into()))
}
