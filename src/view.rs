//! Narrow interfaces between the chain coordinator and its collaborators.
//!
//! The validator, difficulty function and miner depend on these traits,
//! not on the coordinator's concrete type, which keeps the dependency
//! graph acyclic.

use crate::error::ValidationError;
use crate::types::{Block, BlockHeader, Hash256};

/// Read-only access to stored blocks, sufficient for validation and
/// difficulty calculation on any branch.
pub trait ChainView {
    /// Look up a stored block by hash.
    fn block(&self, hash: &Hash256) -> Option<&Block>;

    /// Height of a stored block.
    fn height_of(&self, hash: &Hash256) -> Option<u32>;

    fn header(&self, hash: &Hash256) -> Option<&BlockHeader> {
        self.block(hash).map(|b| &b.header)
    }

    /// Walk `depth` parent links back from `from`. Depth 0 returns `from`
    /// itself (when stored).
    fn ancestor(&self, from: &Hash256, depth: u32) -> Option<Hash256> {
        let mut current = *from;
        for _ in 0..depth {
            current = self.header(&current)?.prev_block_hash;
            if current.is_zero() {
                return None;
            }
        }
        self.header(&current).map(|_| current)
    }

    /// Timestamps of up to `count` blocks ending at `from`, most recent
    /// first. Stops at genesis when fewer ancestors exist.
    fn ancestor_timestamps(&self, from: &Hash256, count: usize) -> Vec<u32> {
        let mut timestamps = Vec::with_capacity(count);
        let mut current = *from;
        while timestamps.len() < count {
            let Some(header) = self.header(&current) else {
                break;
            };
            timestamps.push(header.timestamp);
            if header.prev_block_hash.is_zero() {
                break;
            }
            current = header.prev_block_hash;
        }
        timestamps
    }
}

/// The single entry point a miner uses to hand a solved block to the
/// chain.
pub trait BlockSink {
    /// Submit a candidate block; returns its hash on acceptance.
    fn submit_block(&mut self, block: Block) -> Result<Hash256, ValidationError>;
}
