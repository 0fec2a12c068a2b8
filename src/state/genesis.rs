//! Genesis file loading and data directory initialization.
//!
//! The genesis file is a static JSON mapping of initial accounts to balances;
//! the ledger replays the block log on top of it at startup.

use super::StateError;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Genesis written on first run when no genesis file exists yet.
pub const DEFAULT_GENESIS_JSON: &str = r#"{
  "genesis_time": "2026-01-01T00:00:00.000000000Z",
  "chain_id": "tinychain-devnet",
  "balances": {
    "0x3eb9e5e2af916cf8b6598c25a4a1c5d272d8d1c9": 1000000
  }
}
"#;

/// Initial chain parameters and account balances.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Genesis {
    pub genesis_time: String,
    pub chain_id: String,
    pub balances: HashMap<Address, u64>,
}

impl Genesis {
    /// Load a genesis file from disk.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Directory holding the genesis file and the block log.
pub fn database_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("database")
}

/// Path of the genesis file.
pub fn genesis_json_path(data_dir: &Path) -> PathBuf {
    database_dir(data_dir).join("genesis.json")
}

/// Path of the append-only block log.
pub fn block_db_path(data_dir: &Path) -> PathBuf {
    database_dir(data_dir).join("block.db")
}

/// Initialize a data directory with a genesis file and an empty block log.
///
/// A no-op if the genesis file already exists.
pub fn init_data_dir(data_dir: &Path, genesis_json: &str) -> io::Result<()> {
    if genesis_json_path(data_dir).exists() {
        return Ok(());
    }

    fs::create_dir_all(database_dir(data_dir))?;
    fs::write(genesis_json_path(data_dir), genesis_json)?;
    fs::write(block_db_path(data_dir), "")?;
    Ok(())
}
