//! JSON snapshots of the full chain state.
//!
//! A snapshot records every stored block in insertion order, the UTXO
//! set, the tips and the mempool. Restoring replays block insertions in
//! the recorded order, which rebuilds indexes, tie-breaks and the UTXO
//! set exactly; the result is then cross-checked against the snapshot's
//! own best tip and UTXO entries.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::chain::Blockchain;
use crate::error::ValidationError;
use crate::params::{ConsensusParams, Mode};
use crate::types::{Block, Hash256, OutPoint, Transaction};
use crate::utxo::UtxoEntry;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("snapshot genesis {found} does not match chain genesis {expected}")]
    GenesisMismatch { expected: Hash256, found: Hash256 },

    #[error("snapshot block could not be replayed: {0}")]
    Block(#[from] ValidationError),

    #[error("restored state diverges from snapshot: {0}")]
    StateMismatch(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub height: u32,
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUtxo {
    pub outpoint: OutPoint,
    pub entry: UtxoEntry,
}

/// Serializable image of the entire coordinator state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub mode: Mode,
    pub best_tip: Hash256,
    pub chain_height: u32,
    pub tips: Vec<Hash256>,
    /// All stored blocks, in their original insertion order.
    pub blocks: Vec<SnapshotBlock>,
    pub utxo: Vec<SnapshotUtxo>,
    pub mempool: Vec<Transaction>,
}

/// Capture the chain's full state.
pub fn export(chain: &Blockchain) -> ChainSnapshot {
    let blocks = chain
        .blocks_in_insertion_order()
        .into_iter()
        .map(|(_, height, block)| SnapshotBlock {
            height,
            block: block.clone(),
        })
        .collect();

    let mut utxo: Vec<SnapshotUtxo> = chain
        .utxo()
        .iter()
        .map(|(outpoint, entry)| SnapshotUtxo {
            outpoint: *outpoint,
            entry: entry.clone(),
        })
        .collect();
    utxo.sort_by_key(|u| u.outpoint);

    let mut tips: Vec<Hash256> = chain.tips().iter().copied().collect();
    tips.sort();

    let mempool: Vec<Transaction> = chain.mempool().transactions().cloned().collect();

    ChainSnapshot {
        mode: chain.params().mode,
        best_tip: chain.best_tip(),
        chain_height: chain.height(),
        tips,
        blocks,
        utxo,
        mempool,
    }
}

/// Rebuild a chain from a snapshot by replaying its blocks.
pub fn restore(snapshot: &ChainSnapshot) -> Result<Blockchain, SnapshotError> {
    let mut chain = Blockchain::new(ConsensusParams::for_mode(snapshot.mode));

    if let Some(genesis) = snapshot.blocks.iter().find(|b| b.height == 0) {
        let found = genesis.block.hash();
        let expected = chain.genesis_hash();
        if found != expected {
            return Err(SnapshotError::GenesisMismatch { expected, found });
        }
    }

    for entry in &snapshot.blocks {
        if entry.height == 0 {
            continue;
        }
        chain.add_block(entry.block.clone())?;
    }

    // Mempool contents are best-effort: entries invalidated relative to
    // the replayed chain are dropped.
    for tx in &snapshot.mempool {
        let txid = tx.txid();
        if let Err(err) = chain.add_transaction(tx.clone()) {
            debug!(%txid, %err, "snapshot mempool transaction not restored");
        }
    }

    if chain.best_tip() != snapshot.best_tip {
        return Err(SnapshotError::StateMismatch(format!(
            "best tip {} after replay, snapshot has {}",
            chain.best_tip(),
            snapshot.best_tip
        )));
    }

    let mut rebuilt: Vec<SnapshotUtxo> = chain
        .utxo()
        .iter()
        .map(|(outpoint, entry)| SnapshotUtxo {
            outpoint: *outpoint,
            entry: entry.clone(),
        })
        .collect();
    rebuilt.sort_by_key(|u| u.outpoint);
    let matches = rebuilt.len() == snapshot.utxo.len()
        && rebuilt
            .iter()
            .zip(snapshot.utxo.iter())
            .all(|(a, b)| a.outpoint == b.outpoint && a.entry == b.entry);
    if !matches {
        return Err(SnapshotError::StateMismatch(format!(
            "{} utxo entries after replay, snapshot has {}",
            rebuilt.len(),
            snapshot.utxo.len()
        )));
    }

    info!(
        blocks = snapshot.blocks.len(),
        height = snapshot.chain_height,
        "chain restored from snapshot"
    );
    Ok(chain)
}

/// Export as a pretty JSON string.
pub fn to_json(chain: &Blockchain) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(&export(chain))?)
}

/// Restore from a JSON string.
pub fn from_json(json: &str) -> Result<Blockchain, SnapshotError> {
    let snapshot: ChainSnapshot = serde_json::from_str(json)?;
    restore(&snapshot)
}

/// Write the chain state to a JSON file.
pub fn save_to_file<P: AsRef<Path>>(chain: &Blockchain, path: P) -> Result<(), SnapshotError> {
    fs::write(path, to_json(chain)?)?;
    Ok(())
}

/// Load a chain from a JSON file.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Blockchain, SnapshotError> {
    from_json(&fs::read_to_string(path)?)
}
