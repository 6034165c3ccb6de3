//! The chain coordinator: block storage, best-chain selection, fork
//! handling and reorganization.
//!
//! The blockchain is really a block tree. Blocks are stored by hash with a
//! secondary index per height (several hashes per height during forks) and
//! a set of tips. The best tip is the highest one, with first-seen winning
//! ties: a competing block at the same height never displaces the current
//! tip. The UTXO set and per-block undo data always describe the path from
//! genesis to `best_tip`; every transition between committed heads happens
//! inside a single `&mut self` method, so no observer can see an
//! intermediate state.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::constants::{GENESIS_TIMESTAMP, MAX_BLOCK_SIZE, MEDIAN_TIME_SPAN};
use crate::difficulty::{block_reward, expected_bits, median_time};
use crate::error::{MempoolError, RuleError, ValidationError};
use crate::mempool::Mempool;
use crate::mining::{BlockTemplate, Miner};
use crate::params::ConsensusParams;
use crate::types::{Amount, Block, Hash256, PubKeyHash, Transaction};
use crate::utxo::{BlockUndo, UtxoSet};
use crate::validation::validate_block;
use crate::view::{BlockSink, ChainView};

#[derive(Debug, Clone)]
struct BlockRecord {
    block: Block,
    height: u32,
    /// Insertion order, preserved by snapshots so first-seen tie-breaks
    /// replay identically.
    seq: u64,
}

/// The coordinator owning all chain state.
#[derive(Debug)]
pub struct Blockchain {
    params: ConsensusParams,
    blocks: HashMap<Hash256, BlockRecord>,
    height_index: HashMap<u32, Vec<Hash256>>,
    tips: HashSet<Hash256>,
    best_tip: Hash256,
    utxo: UtxoSet,
    /// Undo data for every block on the current best chain.
    undo: HashMap<Hash256, BlockUndo>,
    mempool: Mempool,
    next_seq: u64,
}

fn current_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl Blockchain {
    /// Create a chain with its genesis block.
    ///
    /// Genesis is hardcoded (timestamp 1231006505, nonce 0, bits at the
    /// profile maximum target) and inserted without proof-of-work
    /// verification.
    pub fn new(params: ConsensusParams) -> Self {
        let coinbase = Transaction::create_coinbase(0, block_reward(0), PubKeyHash::ZERO, 0);
        let merkle_root = crate::merkle::merkle_root(&[coinbase.txid()]);
        let header = crate::types::BlockHeader {
            version: 1,
            prev_block_hash: Hash256::ZERO,
            merkle_root,
            timestamp: GENESIS_TIMESTAMP,
            bits: params.max_target_bits,
            nonce: 0,
        };
        let genesis = Block::new(header, vec![coinbase]);
        let genesis_hash = genesis.hash();

        let mut utxo = UtxoSet::new();
        let genesis_undo = utxo
            .apply_block(&genesis, 0)
            .expect("genesis applies to an empty utxo set");

        let mut blocks = HashMap::new();
        blocks.insert(
            genesis_hash,
            BlockRecord {
                block: genesis,
                height: 0,
                seq: 0,
            },
        );
        let mut height_index: HashMap<u32, Vec<Hash256>> = HashMap::new();
        height_index.insert(0, vec![genesis_hash]);
        let mut tips = HashSet::new();
        tips.insert(genesis_hash);
        let mut undo = HashMap::new();
        undo.insert(genesis_hash, genesis_undo);

        info!(genesis = %genesis_hash, mode = ?params.mode, "chain initialized");
        Blockchain {
            params,
            blocks,
            height_index,
            tips,
            best_tip: genesis_hash,
            utxo,
            undo,
            mempool: Mempool::new(),
            next_seq: 1,
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn best_tip(&self) -> Hash256 {
        self.best_tip
    }

    /// Height of the best tip.
    pub fn height(&self) -> u32 {
        self.blocks[&self.best_tip].height
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.ancestor_at_height(0)
            .expect("the genesis block is always stored")
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_by_hash(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.get(hash).map(|r| &r.block)
    }

    /// The block at `height` on the best chain.
    pub fn block_by_height(&self, height: u32) -> Option<&Block> {
        let hash = self.ancestor_at_height(height)?;
        self.block_by_hash(&hash)
    }

    /// All stored blocks at a height, including side branches.
    pub fn blocks_at_height(&self, height: u32) -> Vec<&Block> {
        self.height_index
            .get(&height)
            .map(|hashes| hashes.iter().filter_map(|h| self.block_by_hash(h)).collect())
            .unwrap_or_default()
    }

    pub fn tips(&self) -> &HashSet<Hash256> {
        &self.tips
    }

    /// Hashes from genesis to the best tip, in chain order.
    pub fn best_chain(&self) -> Vec<Hash256> {
        let mut chain = Vec::with_capacity(self.height() as usize + 1);
        let mut current = self.best_tip;
        loop {
            chain.push(current);
            let header = &self.blocks[&current].block.header;
            if header.prev_block_hash.is_zero() {
                break;
            }
            current = header.prev_block_hash;
        }
        chain.reverse();
        chain
    }

    /// Stored blocks in insertion order, for snapshots.
    pub fn blocks_in_insertion_order(&self) -> Vec<(Hash256, u32, &Block)> {
        let mut records: Vec<(&Hash256, &BlockRecord)> = self.blocks.iter().collect();
        records.sort_by_key(|(_, r)| r.seq);
        records
            .into_iter()
            .map(|(h, r)| (*h, r.height, &r.block))
            .collect()
    }

    /// Read-only view of the best chain's UTXO set.
    pub fn utxo(&self) -> &UtxoSet {
        &self.utxo
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Confirmed balance of a pubkey hash on the best chain.
    pub fn balance_of(&self, script_pubkey: &PubKeyHash) -> Amount {
        self.utxo.balance_of(script_pubkey)
    }

    /// Difficulty bits the next block on the best chain must carry.
    pub fn next_difficulty_bits(&self) -> u32 {
        expected_bits(self, &self.best_tip, self.height() + 1, &self.params)
            .expect("the best chain has full ancestry")
    }

    fn ancestor_at_height(&self, height: u32) -> Option<Hash256> {
        let best_height = self.height();
        if height > best_height {
            return None;
        }
        self.ancestor(&self.best_tip, best_height - height)
    }

    /// Submit a transaction to the mempool, validated against the current
    /// UTXO view at the next block height.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<Hash256, MempoolError> {
        let next_height = self.height() + 1;
        let params = self.params;
        self.mempool.add(tx, &self.utxo, next_height, &params)
    }

    /// Attempt to add a candidate block.
    ///
    /// 1. Reject duplicates and orphans.
    /// 2. Validate: fully (with the UTXO view) when the block extends the
    ///    best tip, header/context rules only on side branches.
    /// 3. Store and index the block, update tips.
    /// 4. Extend the best chain, trigger a reorganization when a side
    ///    branch becomes strictly higher, or just store the block.
    ///
    /// A rejected block, including one that triggers a failed
    /// reorganization, leaves no trace in the store.
    pub fn add_block(&mut self, block: Block) -> Result<Hash256, ValidationError> {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return Err(ValidationError::DuplicateBlock(hash));
        }
        let parent_hash = block.header.prev_block_hash;
        let Some(parent) = self.blocks.get(&parent_hash) else {
            return Err(ValidationError::OrphanBlock(parent_hash));
        };
        let height = parent.height + 1;
        let best_height = self.height();
        let extends_best = parent_hash == self.best_tip;

        let utxo_view = if extends_best { Some(&self.utxo) } else { None };
        validate_block(&block, height, self, utxo_view, &self.params, current_time())
            .map_err(|rule| ValidationError::InvalidBlock { hash, rule })?;

        let parent_was_tip = self.tips.remove(&parent_hash);
        self.tips.insert(hash);
        self.blocks.insert(
            hash,
            BlockRecord {
                block,
                height,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        self.height_index.entry(height).or_default().push(hash);

        if extends_best {
            let record = self.blocks.get(&hash).expect("block was just stored");
            let undo = self
                .utxo
                .apply_block(&record.block, height)
                .expect("a validated block applies to the utxo set");
            self.undo.insert(hash, undo);
            self.best_tip = hash;
            self.mempool.remove_confirmed(&record.block);
            info!(%hash, height, "best chain extended");
        } else if height > best_height {
            info!(%hash, height, best_height, "side branch overtakes best chain");
            if let Err(err) = self.reorganize(hash) {
                // The triggering block is rejected: undo its insertion.
                self.blocks.remove(&hash);
                self.tips.remove(&hash);
                if parent_was_tip {
                    self.tips.insert(parent_hash);
                }
                if let Some(at_height) = self.height_index.get_mut(&height) {
                    at_height.retain(|h| h != &hash);
                    if at_height.is_empty() {
                        self.height_index.remove(&height);
                    }
                }
                return Err(err);
            }
        } else {
            debug!(%hash, height, best_height, "stored side-branch block");
        }

        Ok(hash)
    }

    /// Mine the next block on the best tip and self-submit it.
    pub fn mine_next_block(&mut self, recipient: PubKeyHash) -> Result<Block, ValidationError> {
        let template = self.build_template(recipient);
        let mut miner = Miner::new();
        let block = miner.mine(&template);
        self.add_block(block.clone())?;
        Ok(block)
    }

    /// Assemble a template for the next block on the best tip: coinbase
    /// claiming subsidy plus fees, then the top-fee-rate mempool
    /// transactions that fit the size budget.
    pub fn build_template(&self, recipient: PubKeyHash) -> BlockTemplate {
        let parent = self.best_tip;
        let height = self.height() + 1;
        let bits = self.next_difficulty_bits();

        // Leave room for the header, counts and coinbase.
        let selected = self.mempool.take_top(MAX_BLOCK_SIZE - 1_000);
        let fees: Amount = selected.iter().map(|(_, fee)| *fee).sum();
        let transactions: Vec<Transaction> = selected.into_iter().map(|(tx, _)| tx).collect();

        // A timestamp of max(now, MTP + 1) stays valid even when blocks
        // are mined faster than the clock ticks.
        let timestamps = self.ancestor_timestamps(&parent, MEDIAN_TIME_SPAN);
        let floor = median_time(&timestamps) + 1;
        let timestamp = current_time().max(floor);

        BlockTemplate {
            height,
            prev_block_hash: parent,
            bits,
            timestamp,
            reward: block_reward(height) + fees,
            recipient,
            transactions,
        }
    }

    /// Most recent block on both the path to `a` and the path to `b`.
    fn find_common_ancestor(&self, a: Hash256, b: Hash256) -> Option<Hash256> {
        let mut on_a: HashSet<Hash256> = HashSet::new();
        let mut current = a;
        loop {
            on_a.insert(current);
            let header = &self.blocks.get(&current)?.block.header;
            if header.prev_block_hash.is_zero() {
                break;
            }
            current = header.prev_block_hash;
        }

        let mut current = b;
        loop {
            if on_a.contains(&current) {
                return Some(current);
            }
            let header = &self.blocks.get(&current)?.block.header;
            if header.prev_block_hash.is_zero() {
                return None;
            }
            current = header.prev_block_hash;
        }
    }

    /// Switch the best chain to the branch ending at `new_tip`.
    ///
    /// Unwinds the old branch tip-to-ancestor (collecting its non-coinbase
    /// transactions), then rewinds the new branch ancestor-to-tip,
    /// revalidating every block against the reconstructed UTXO view: a
    /// transaction that was valid on the old chain may double-spend on the
    /// new one. Any failure rolls the whole attempt back.
    fn reorganize(&mut self, new_tip: Hash256) -> Result<(), ValidationError> {
        let old_tip = self.best_tip;
        let ancestor = self
            .find_common_ancestor(old_tip, new_tip)
            .expect("all stored branches share the genesis block");

        let mut old_path = Vec::new();
        let mut current = old_tip;
        while current != ancestor {
            old_path.push(current);
            current = self.blocks[&current].block.header.prev_block_hash;
        }
        let mut new_path = Vec::new();
        let mut current = new_tip;
        while current != ancestor {
            new_path.push(current);
            current = self.blocks[&current].block.header.prev_block_hash;
        }
        new_path.reverse();

        info!(
            %old_tip, %new_tip, %ancestor,
            unwind = old_path.len(),
            rewind = new_path.len(),
            "reorganizing chain"
        );

        // Unwind the old branch, newest block first.
        let mut unwound_txs: Vec<Transaction> = Vec::new();
        let mut unwound: Vec<Hash256> = Vec::new();
        for hash in &old_path {
            let undo = self
                .undo
                .remove(hash)
                .expect("every best-chain block has undo data");
            let record = self.blocks.get(hash).expect("best-chain block is stored");
            self.utxo
                .revert_block(&record.block, &undo)
                .expect("undo data reverts its own block");
            unwound_txs.extend(record.block.transactions.iter().skip(1).cloned());
            unwound.push(*hash);
        }

        // Rewind the new branch, revalidating against the rebuilt view.
        let now = current_time();
        let mut applied: Vec<Hash256> = Vec::new();
        let mut failure: Option<RuleError> = None;
        for hash in &new_path {
            let height = self.blocks[hash].height;
            let result = validate_block(
                &self.blocks[hash].block,
                height,
                self,
                Some(&self.utxo),
                &self.params,
                now,
            );
            match result {
                Ok(_) => {
                    let record = self.blocks.get(hash).expect("new-branch block is stored");
                    let undo = self
                        .utxo
                        .apply_block(&record.block, height)
                        .expect("a validated block applies to the utxo set");
                    self.undo.insert(*hash, undo);
                    applied.push(*hash);
                }
                Err(rule) => {
                    failure = Some(rule);
                    break;
                }
            }
        }

        if let Some(rule) = failure {
            // Full rollback: revert what was applied, restore the old
            // branch in forward order.
            for hash in applied.iter().rev() {
                let undo = self
                    .undo
                    .remove(hash)
                    .expect("applied block has undo data");
                let record = self.blocks.get(hash).expect("stored");
                self.utxo
                    .revert_block(&record.block, &undo)
                    .expect("undo data reverts its own block");
            }
            for hash in unwound.iter().rev() {
                let record = self.blocks.get(hash).expect("stored");
                let undo = self
                    .utxo
                    .apply_block(&record.block, record.height)
                    .expect("the previous best chain re-applies");
                self.undo.insert(*hash, undo);
            }
            warn!(%new_tip, %rule, "reorganization aborted, previous chain restored");
            return Err(ValidationError::InvalidReorg { new_tip, rule });
        }

        // Commit: move the tip, then reconcile the mempool.
        self.best_tip = new_tip;
        for hash in &new_path {
            let record = self.blocks.get(hash).expect("stored");
            self.mempool.remove_confirmed(&record.block);
        }
        let next_height = self.height() + 1;
        let params = self.params;
        let reinserted = self
            .mempool
            .reinsert(unwound_txs, &self.utxo, next_height, &params);
        info!(
            %new_tip,
            height = next_height - 1,
            reinserted,
            "reorganization complete"
        );
        Ok(())
    }
}

impl ChainView for Blockchain {
    fn block(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.get(hash).map(|r| &r.block)
    }

    fn height_of(&self, hash: &Hash256) -> Option<u32> {
        self.blocks.get(hash).map(|r| r.height)
    }
}

impl BlockSink for Blockchain {
    fn submit_block(&mut self, block: Block) -> Result<Hash256, ValidationError> {
        self.add_block(block)
    }
}
