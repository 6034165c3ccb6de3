//! Proof-of-work mining: block templates and the nonce search.
//!
//! The search walks the 32-bit nonce space; on exhaustion it increments
//! the extra nonce embedded in the coinbase signature script, which
//! changes the coinbase txid and therefore the merkle root, opening a
//! fresh nonce space.

use tracing::{debug, info};

use crate::pow::{hash_to_value, target_from_compact};
use crate::types::{Amount, Block, BlockHeader, Hash256, PubKeyHash, Transaction};
use crate::view::BlockSink;

/// Everything needed to assemble candidate blocks for one height.
///
/// The template is rebuilt (not patched) per extra nonce so the coinbase,
/// merkle root and header always agree.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub height: u32,
    pub prev_block_hash: Hash256,
    pub bits: u32,
    pub timestamp: u32,
    /// Coinbase claim: subsidy plus the fees of `transactions`.
    pub reward: Amount,
    pub recipient: PubKeyHash,
    /// Non-coinbase transactions in template order.
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    /// Materialize the candidate block for a given extra nonce, with the
    /// header nonce zeroed.
    pub fn build(&self, extra_nonce: u64) -> Block {
        let coinbase =
            Transaction::create_coinbase(self.height, self.reward, self.recipient, extra_nonce);
        let mut transactions = Vec::with_capacity(1 + self.transactions.len());
        transactions.push(coinbase);
        transactions.extend(self.transactions.iter().cloned());

        let txids: Vec<Hash256> = transactions.iter().map(|tx| tx.txid()).collect();
        let header = BlockHeader {
            version: 1,
            prev_block_hash: self.prev_block_hash,
            merkle_root: crate::merkle::merkle_root(&txids),
            timestamp: self.timestamp,
            bits: self.bits,
            nonce: 0,
        };
        Block::new(header, transactions)
    }
}

/// The proof-of-work miner.
#[derive(Debug, Default)]
pub struct Miner {
    /// Skip the target check and return the nonce-0 block. Such blocks
    /// fail validation; only tests that bypass the coordinator use them.
    pub instant_mine: bool,
    /// Hashes computed over the miner's lifetime.
    pub hash_count: u64,
}

impl Miner {
    pub fn new() -> Self {
        Miner {
            instant_mine: false,
            hash_count: 0,
        }
    }

    pub fn instant() -> Self {
        Miner {
            instant_mine: true,
            hash_count: 0,
        }
    }

    /// Find a nonce (and extra nonce) satisfying the template's target.
    pub fn mine(&mut self, template: &BlockTemplate) -> Block {
        if self.instant_mine {
            return template.build(0);
        }

        let target = target_from_compact(template.bits);
        let mut extra_nonce: u64 = 0;
        loop {
            let mut block = template.build(extra_nonce);
            let mut nonce: u32 = 0;
            loop {
                block.header.nonce = nonce;
                let hash = block.header.hash();
                self.hash_count += 1;
                if hash_to_value(&hash) <= target {
                    info!(
                        height = template.height,
                        nonce,
                        extra_nonce,
                        hashes = self.hash_count,
                        %hash,
                        "block mined"
                    );
                    return block;
                }
                if nonce == u32::MAX {
                    break;
                }
                nonce += 1;
            }
            // Nonce space exhausted: mutate the coinbase and start over.
            extra_nonce += 1;
            debug!(extra_nonce, "nonce space exhausted, rolling extra nonce");
        }
    }

    /// Mine and hand the solved block to the chain.
    pub fn mine_and_submit(
        &mut self,
        template: &BlockTemplate,
        sink: &mut dyn BlockSink,
    ) -> Result<Hash256, crate::error::ValidationError> {
        let block = self.mine(template);
        sink.submit_block(block)
    }
}
