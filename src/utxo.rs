//! The in-memory UTXO ledger.
//!
//! Key uniqueness is a consensus invariant: inserting an existing outpoint
//! or removing a missing one is a [`RuleError`], never silently ignored.
//! Applying a block records the entries it consumed as [`BlockUndo`], so a
//! reorganization can revert the block in O(changes) instead of replaying
//! the chain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::RuleError;
use crate::types::{Amount, Block, OutPoint, PubKeyHash};

/// One unspent output and the context needed to validate spending it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub value: Amount,
    pub script_pubkey: PubKeyHash,
    /// Height of the block that created this output.
    pub height: u32,
    /// Coinbase outputs are subject to the maturity rule.
    pub is_coinbase: bool,
}

/// Entries a block removed, in removal order, for exact reversal.
#[derive(Debug, Clone, Default)]
pub struct BlockUndo {
    pub spent: Vec<(OutPoint, UtxoEntry)>,
}

/// Mapping from outpoint to unspent entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    /// Insert a new entry; duplicate keys are a consensus failure.
    pub fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) -> Result<(), RuleError> {
        if self.entries.contains_key(&outpoint) {
            return Err(RuleError::DuplicateUtxo(outpoint));
        }
        self.entries.insert(outpoint, entry);
        Ok(())
    }

    /// Remove and return an entry; missing keys are a consensus failure.
    pub fn remove(&mut self, outpoint: &OutPoint) -> Result<UtxoEntry, RuleError> {
        self.entries
            .remove(outpoint)
            .ok_or(RuleError::MissingUtxo(*outpoint))
    }

    /// Total value locked to a pubkey hash.
    pub fn balance_of(&self, script_pubkey: &PubKeyHash) -> Amount {
        self.entries
            .values()
            .filter(|e| e.script_pubkey == *script_pubkey)
            .map(|e| e.value)
            .sum()
    }

    /// All outpoints locked to a pubkey hash, with their entries.
    pub fn utxos_for(&self, script_pubkey: &PubKeyHash) -> Vec<(OutPoint, UtxoEntry)> {
        let mut found: Vec<(OutPoint, UtxoEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.script_pubkey == *script_pubkey)
            .map(|(op, e)| (*op, e.clone()))
            .collect();
        // Deterministic order for coin selection and tests.
        found.sort_by_key(|(op, _)| *op);
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.entries.iter()
    }

    /// Apply a block at `height`: per transaction in array order, remove
    /// the spent inputs, then add the created outputs. A transaction may
    /// spend an output created earlier in the same block.
    pub fn apply_block(&mut self, block: &Block, height: u32) -> Result<BlockUndo, RuleError> {
        let mut undo = BlockUndo::default();
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let entry = self.remove(&input.prevout)?;
                    undo.spent.push((input.prevout, entry));
                }
            }
            let txid = tx.txid();
            let is_coinbase = tx.is_coinbase();
            for (index, output) in tx.outputs.iter().enumerate() {
                self.insert(
                    OutPoint::new(txid, index as u32),
                    UtxoEntry {
                        value: output.value,
                        script_pubkey: output.script_pubkey,
                        height,
                        is_coinbase,
                    },
                )?;
            }
        }
        debug!(
            height,
            spent = undo.spent.len(),
            utxos = self.len(),
            "applied block to utxo set"
        );
        Ok(undo)
    }

    /// Exact inverse of [`apply_block`](Self::apply_block): remove the
    /// block's outputs in reverse transaction order, then restore the
    /// spent entries recorded in the undo data.
    pub fn revert_block(&mut self, block: &Block, undo: &BlockUndo) -> Result<(), RuleError> {
        for tx in block.transactions.iter().rev() {
            let txid = tx.txid();
            for index in (0..tx.outputs.len()).rev() {
                self.remove(&OutPoint::new(txid, index as u32))?;
            }
        }
        for (outpoint, entry) in undo.spent.iter().rev() {
            self.insert(*outpoint, entry.clone())?;
        }
        debug!(
            restored = undo.spent.len(),
            utxos = self.len(),
            "reverted block from utxo set"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Hash256, Transaction, TransactionInput, TransactionOutput,
    };

    fn entry(value: Amount) -> UtxoEntry {
        UtxoEntry {
            value,
            script_pubkey: PubKeyHash::from_bytes([3u8; 20]),
            height: 1,
            is_coinbase: false,
        }
    }

    fn outpoint(n: u8) -> OutPoint {
        OutPoint::new(Hash256::from_bytes([n; 32]), 0)
    }

    #[test]
    fn insert_get_remove() {
        let mut set = UtxoSet::new();
        set.insert(outpoint(1), entry(1000)).unwrap();
        assert_eq!(set.get(&outpoint(1)).unwrap().value, 1000);
        assert_eq!(set.remove(&outpoint(1)).unwrap().value, 1000);
        assert!(set.is_empty());
    }

    #[test]
    fn duplicate_insert_is_consensus_failure() {
        let mut set = UtxoSet::new();
        set.insert(outpoint(1), entry(1)).unwrap();
        assert_eq!(
            set.insert(outpoint(1), entry(2)),
            Err(RuleError::DuplicateUtxo(outpoint(1)))
        );
    }

    #[test]
    fn missing_remove_is_consensus_failure() {
        let mut set = UtxoSet::new();
        assert_eq!(
            set.remove(&outpoint(9)),
            Err(RuleError::MissingUtxo(outpoint(9)))
        );
    }

    #[test]
    fn balance_sums_matching_scripts() {
        let mut set = UtxoSet::new();
        let alice = PubKeyHash::from_bytes([0xaa; 20]);
        let bob = PubKeyHash::from_bytes([0xbb; 20]);
        set.insert(
            outpoint(1),
            UtxoEntry {
                value: 30,
                script_pubkey: alice,
                height: 0,
                is_coinbase: false,
            },
        )
        .unwrap();
        set.insert(
            outpoint(2),
            UtxoEntry {
                value: 12,
                script_pubkey: alice,
                height: 0,
                is_coinbase: false,
            },
        )
        .unwrap();
        set.insert(
            outpoint(3),
            UtxoEntry {
                value: 7,
                script_pubkey: bob,
                height: 0,
                is_coinbase: false,
            },
        )
        .unwrap();

        assert_eq!(set.balance_of(&alice), 42);
        assert_eq!(set.balance_of(&bob), 7);
        assert_eq!(set.balance_of(&PubKeyHash::ZERO), 0);
        assert_eq!(set.utxos_for(&alice).len(), 2);
    }

    fn block_with(transactions: Vec<Transaction>) -> Block {
        let header = crate::types::BlockHeader {
            version: 1,
            prev_block_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 0,
            bits: 0x1f0fffff,
            nonce: 0,
        };
        Block::new(header, transactions)
    }

    #[test]
    fn apply_then_revert_restores_state() {
        let mut set = UtxoSet::new();
        let recipient = PubKeyHash::from_bytes([1u8; 20]);
        let coinbase = Transaction::create_coinbase(1, 50, recipient, 0);
        let cb_txid = coinbase.txid();

        let block1 = block_with(vec![coinbase]);
        let undo1 = set.apply_block(&block1, 1).unwrap();
        assert!(undo1.spent.is_empty());
        assert_eq!(set.balance_of(&recipient), 50);

        // Block 2 spends the coinbase output.
        let spend = Transaction::new(
            vec![TransactionInput::new(OutPoint::new(cb_txid, 0))],
            vec![TransactionOutput::new(
                40,
                PubKeyHash::from_bytes([2u8; 20]),
            )],
        );
        let cb2 = Transaction::create_coinbase(2, 60, recipient, 0);
        let block2 = block_with(vec![cb2, spend]);

        let before = set.clone();
        let undo2 = set.apply_block(&block2, 2).unwrap();
        assert_eq!(undo2.spent.len(), 1);
        assert_eq!(set.balance_of(&recipient), 60);

        set.revert_block(&block2, &undo2).unwrap();
        assert_eq!(set, before);
    }

    #[test]
    fn intra_block_spend_requires_producer_first() {
        let mut set = UtxoSet::new();
        let recipient = PubKeyHash::from_bytes([1u8; 20]);
        let coinbase = Transaction::create_coinbase(1, 50, recipient, 0);
        let produce = Transaction::new(
            vec![TransactionInput::new(OutPoint::new(coinbase.txid(), 0))],
            vec![TransactionOutput::new(50, recipient)],
        );
        let spend = Transaction::new(
            vec![TransactionInput::new(OutPoint::new(produce.txid(), 0))],
            vec![TransactionOutput::new(50, recipient)],
        );

        // Producer after spender: the spend sees a missing utxo.
        let mut wrong_order = UtxoSet::new();
        let bad = block_with(vec![
            Transaction::create_coinbase(1, 50, recipient, 1),
            spend.clone(),
            produce.clone(),
        ]);
        assert!(matches!(
            wrong_order.apply_block(&bad, 1),
            Err(RuleError::MissingUtxo(_))
        ));

        // Producer before spender works, but only with the coinbase the
        // producer spends present.
        let genesis = block_with(vec![coinbase]);
        set.apply_block(&genesis, 0).unwrap();
        let good = block_with(vec![
            Transaction::create_coinbase(1, 50, recipient, 1),
            produce,
            spend,
        ]);
        set.apply_block(&good, 1).unwrap();
    }

    #[test]
    fn double_apply_of_same_coinbase_fails() {
        let mut set = UtxoSet::new();
        let coinbase = Transaction::create_coinbase(1, 50, PubKeyHash::ZERO, 0);
        let block = block_with(vec![coinbase]);
        set.apply_block(&block, 1).unwrap();
        assert!(matches!(
            set.apply_block(&block, 1),
            Err(RuleError::DuplicateUtxo(_))
        ));
    }
}
