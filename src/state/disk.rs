//! The append-only block log.
//!
//! Each accepted block is appended as one JSON `{"hash": …, "block": …}`
//! record per line. The ledger is reconstructed at startup by replaying the
//! log from the genesis balances forward, so a record is only ever written
//! after the block has passed validation.

use super::StateError;
use crate::types::{Block, BlockHash};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One persisted block, keyed by its hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: BlockHash,
    pub block: Block,
}

/// Append handle over the block log file.
pub struct BlockLog {
    path: PathBuf,
    file: File,
}

impl BlockLog {
    /// Open (or create) the block log at the given path.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one record and flush it to the OS.
    pub fn append(&mut self, record: &BlockRecord) -> Result<(), StateError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }

    /// Read every record in append order.
    pub fn records(&self) -> Result<Vec<BlockRecord>, StateError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// All blocks strictly after `from` in chain order.
    ///
    /// The zero hash selects the whole chain; an unknown hash yields an empty
    /// range (the caller's chain has diverged or is ahead).
    pub fn blocks_after(&self, from: BlockHash) -> Result<Vec<Block>, StateError> {
        let mut collecting = from.is_zero();
        let mut blocks = Vec::new();

        for record in self.records()? {
            if collecting {
                blocks.push(record.block);
            } else if record.hash == from {
                collecting = true;
            }
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use tempfile::tempdir;

    fn test_block(number: u64, parent: BlockHash) -> BlockRecord {
        let block = Block::new(parent, number, 0, 1_700_000_000 + number, Address::ZERO, vec![]);
        BlockRecord {
            hash: block.hash(),
            block,
        }
    }

    fn test_log(dir: &Path) -> BlockLog {
        BlockLog::open(&dir.join("block.db")).unwrap()
    }

    #[test]
    fn test_append_and_read_back() {
        let tmp = tempdir().unwrap();
        let mut log = test_log(tmp.path());

        let rec0 = test_block(0, BlockHash::ZERO);
        let rec1 = test_block(1, rec0.hash);
        log.append(&rec0).unwrap();
        log.append(&rec1).unwrap();

        let records = log.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hash, rec0.hash);
        assert_eq!(records[1].block.header.number, 1);
    }

    #[test]
    fn test_blocks_after_zero_returns_all() {
        let tmp = tempdir().unwrap();
        let mut log = test_log(tmp.path());

        let rec0 = test_block(0, BlockHash::ZERO);
        let rec1 = test_block(1, rec0.hash);
        log.append(&rec0).unwrap();
        log.append(&rec1).unwrap();

        let blocks = log.blocks_after(BlockHash::ZERO).unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_blocks_after_skips_up_to_match() {
        let tmp = tempdir().unwrap();
        let mut log = test_log(tmp.path());

        let rec0 = test_block(0, BlockHash::ZERO);
        let rec1 = test_block(1, rec0.hash);
        let rec2 = test_block(2, rec1.hash);
        log.append(&rec0).unwrap();
        log.append(&rec1).unwrap();
        log.append(&rec2).unwrap();

        let blocks = log.blocks_after(rec0.hash).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].header.number, 1);
        assert_eq!(blocks[1].header.number, 2);
    }

    #[test]
    fn test_blocks_after_unknown_hash_is_empty() {
        let tmp = tempdir().unwrap();
        let mut log = test_log(tmp.path());
        log.append(&test_block(0, BlockHash::ZERO)).unwrap();

        let blocks = log.blocks_after(BlockHash([0xAA; 32])).unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_empty_log() {
        let tmp = tempdir().unwrap();
        let log = test_log(tmp.path());
        assert!(log.records().unwrap().is_empty());
        assert!(log.blocks_after(BlockHash::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_line_fails() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("block.db");
        std::fs::write(&path, "not json\n").unwrap();

        let log = BlockLog::open(&path).unwrap();
        assert!(log.records().is_err());
    }
}
