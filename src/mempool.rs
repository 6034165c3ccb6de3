//! The transaction memory pool.
//!
//! First-seen policy: the first valid transaction spending an outpoint
//! wins and later conflicts are rejected. Entries carry their fee and
//! fee rate so block templates can take the most profitable set within a
//! byte budget.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_MEMPOOL_CAPACITY;
use crate::error::MempoolError;
use crate::params::ConsensusParams;
use crate::types::{Amount, Block, Hash256, OutPoint, Transaction};
use crate::utxo::UtxoSet;
use crate::validation::validate_transaction;

/// A pooled transaction with its fee metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub fee: Amount,
    /// Satoshi per 1000 bytes, the ordering key for template assembly.
    pub fee_rate: u64,
    pub size: usize,
}

/// Pending transactions indexed by txid, with a spent-outpoint index for
/// conflict detection.
#[derive(Debug)]
pub struct Mempool {
    entries: HashMap<Hash256, MempoolEntry>,
    spends: HashMap<OutPoint, Hash256>,
    capacity: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Mempool {
            entries: HashMap::new(),
            spends: HashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Whether a pooled transaction already spends this outpoint.
    pub fn spends_outpoint(&self, outpoint: &OutPoint) -> bool {
        self.spends.contains_key(outpoint)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.values().map(|e| &e.tx)
    }

    /// Validate and admit a transaction.
    ///
    /// `next_height` is the height the transaction would confirm at, used
    /// for the coinbase-maturity check.
    pub fn add(
        &mut self,
        tx: Transaction,
        utxo: &UtxoSet,
        next_height: u32,
        params: &ConsensusParams,
    ) -> Result<Hash256, MempoolError> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::DuplicateTransaction(txid));
        }
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }
        for input in &tx.inputs {
            if self.spends.contains_key(&input.prevout) {
                return Err(MempoolError::DoubleSpend(input.prevout));
            }
        }
        if self.entries.len() >= self.capacity {
            return Err(MempoolError::Full {
                len: self.entries.len(),
                max: self.capacity,
            });
        }

        let fee = validate_transaction(&tx, utxo, &HashSet::new(), next_height, params)?;
        let size = tx.serialized_size();
        let fee_rate = if size == 0 { 0 } else { fee * 1000 / size as u64 };

        for input in &tx.inputs {
            self.spends.insert(input.prevout, txid);
        }
        self.entries.insert(
            txid,
            MempoolEntry {
                tx,
                fee,
                fee_rate,
                size,
            },
        );
        info!(%txid, fee, fee_rate, "transaction accepted into mempool");
        Ok(txid)
    }

    /// Remove a transaction and release its spent-outpoint claims.
    pub fn remove(&mut self, txid: &Hash256) -> Option<Transaction> {
        let entry = self.entries.remove(txid)?;
        for input in &entry.tx.inputs {
            self.spends.remove(&input.prevout);
        }
        Some(entry.tx)
    }

    /// Highest-fee-rate transactions whose combined size fits the budget.
    ///
    /// Ties break by fee, then txid, so template assembly is
    /// deterministic.
    pub fn take_top(&self, limit_bytes: usize) -> Vec<(Transaction, Amount)> {
        let mut ordered: Vec<&MempoolEntry> = self.entries.values().collect();
        ordered.sort_by(|a, b| {
            b.fee_rate
                .cmp(&a.fee_rate)
                .then(b.fee.cmp(&a.fee))
                .then(a.tx.txid().cmp(&b.tx.txid()))
        });

        let mut selected = Vec::new();
        let mut used = 0usize;
        for entry in ordered {
            if used + entry.size > limit_bytes {
                continue;
            }
            used += entry.size;
            selected.push((entry.tx.clone(), entry.fee));
        }
        selected
    }

    /// Drop every transaction confirmed by `block`, plus any entry that
    /// conflicts with an outpoint the block spent.
    pub fn remove_confirmed(&mut self, block: &Block) -> usize {
        let mut removed = 0;
        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            if self.remove(&tx.txid()).is_some() {
                removed += 1;
            }
            // First-seen conflicts are now unspendable.
            for input in &tx.inputs {
                if let Some(conflict) = self.spends.get(&input.prevout).copied() {
                    warn!(txid = %conflict, outpoint = %input.prevout,
                        "evicting mempool transaction conflicting with confirmed block");
                    self.remove(&conflict);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "cleared confirmed transactions");
        }
        removed
    }

    /// Re-offer transactions unwound from an abandoned branch. Entries
    /// that no longer validate against the new chain state are dropped.
    pub fn reinsert(
        &mut self,
        txs: Vec<Transaction>,
        utxo: &UtxoSet,
        next_height: u32,
        params: &ConsensusParams,
    ) -> usize {
        let mut accepted = 0;
        for tx in txs {
            let txid = tx.txid();
            match self.add(tx, utxo, next_height, params) {
                Ok(_) => accepted += 1,
                Err(err) => debug!(%txid, %err, "unwound transaction not re-added"),
            }
        }
        accepted
    }
}
