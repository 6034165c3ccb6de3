//! Block and header codecs, block hashing and the merkle commitment.

use crate::encoding::{encode_varint, ByteReader};
use crate::error::EncodingError;
use crate::hashes::double_sha256;
use crate::merkle::merkle_root;
use crate::pow::hash_meets_target;
use crate::types::{Block, BlockHeader, Hash256, Transaction};

/// Serialized header size on the wire.
pub const HEADER_SIZE: usize = 80;

impl BlockHeader {
    /// Serialize to exactly 80 bytes: version, prev hash, merkle root,
    /// timestamp, bits, nonce. Integers little-endian, hashes in natural
    /// byte order.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_block_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn deserialize_from(reader: &mut ByteReader<'_>) -> Result<Self, EncodingError> {
        let version = reader.read_u32_le()?;
        let prev_block_hash = Hash256::from_bytes(reader.read_array()?);
        let merkle_root = Hash256::from_bytes(reader.read_array()?);
        let timestamp = reader.read_u32_le()?;
        let bits = reader.read_u32_le()?;
        let nonce = reader.read_u32_le()?;
        Ok(BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, EncodingError> {
        let mut reader = ByteReader::new(data);
        let header = Self::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(header)
    }

    /// Block hash: double SHA-256 of the 80-byte serialization.
    pub fn hash(&self) -> Hash256 {
        Hash256::from_bytes(double_sha256(&self.serialize()))
    }

    /// Whether this header's hash satisfies its own compact target.
    pub fn meets_difficulty_target(&self) -> bool {
        hash_meets_target(&self.hash(), self.bits)
    }
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&self.header.serialize());
        out.extend_from_slice(&encode_varint(self.transactions.len() as u64));
        for tx in &self.transactions {
            out.extend_from_slice(&tx.serialize());
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, EncodingError> {
        let mut reader = ByteReader::new(data);
        let header = BlockHeader::deserialize_from(&mut reader)?;
        let tx_count = reader.read_varint()? as usize;
        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            transactions.push(Transaction::deserialize_from(&mut reader)?);
        }
        reader.finish()?;
        Ok(Block {
            header,
            transactions,
        })
    }

    pub fn serialized_size(&self) -> usize {
        HEADER_SIZE
            + encode_varint(self.transactions.len() as u64).len()
            + self
                .transactions
                .iter()
                .map(|tx| tx.serialized_size())
                .sum::<usize>()
    }

    pub fn txids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }

    /// Merkle root over the block's txids.
    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root(&self.txids())
    }

    /// The coinbase, when the block is well-formed.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PubKeyHash;

    fn sample_block() -> Block {
        let coinbase = Transaction::create_coinbase(1, 50_0000_0000, PubKeyHash::ZERO, 0);
        let merkle = merkle_root(&[coinbase.txid()]);
        let header = BlockHeader {
            version: 1,
            prev_block_hash: Hash256::from_bytes([5u8; 32]),
            merkle_root: merkle,
            timestamp: 1_231_006_505,
            bits: 0x1f0fffff,
            nonce: 12345,
        };
        Block::new(header, vec![coinbase])
    }

    #[test]
    fn header_serializes_to_eighty_bytes() {
        let block = sample_block();
        assert_eq!(block.header.serialize().len(), HEADER_SIZE);
    }

    #[test]
    fn header_round_trip() {
        let header = sample_block().header;
        let bytes = header.serialize();
        assert_eq!(BlockHeader::deserialize(&bytes).unwrap(), header);
    }

    #[test]
    fn header_field_layout() {
        let header = sample_block().header;
        let bytes = header.serialize();
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..36], header.prev_block_hash.as_bytes());
        assert_eq!(&bytes[36..68], header.merkle_root.as_bytes());
        assert_eq!(&bytes[68..72], &1_231_006_505u32.to_le_bytes());
        assert_eq!(&bytes[72..76], &0x1f0fffffu32.to_le_bytes());
        assert_eq!(&bytes[76..80], &12345u32.to_le_bytes());
    }

    #[test]
    fn block_round_trip() {
        let block = sample_block();
        let bytes = block.serialize();
        assert_eq!(bytes.len(), block.serialized_size());
        assert_eq!(Block::deserialize(&bytes).unwrap(), block);
    }

    #[test]
    fn truncated_header_fails() {
        assert!(BlockHeader::deserialize(&[0u8; 79]).is_err());
    }

    #[test]
    fn hash_changes_with_nonce() {
        let block = sample_block();
        let mut other = block.header;
        other.nonce += 1;
        assert_ne!(block.header.hash(), other.hash());
    }

    #[test]
    fn merkle_root_commits_to_single_coinbase() {
        let block = sample_block();
        // Single transaction: the root is the coinbase txid.
        assert_eq!(block.compute_merkle_root(), block.transactions[0].txid());
        assert_eq!(block.compute_merkle_root(), block.header.merkle_root);
    }

    #[test]
    fn coinbase_accessor() {
        let block = sample_block();
        assert!(block.coinbase().is_some());

        let headerless = Block::new(block.header, vec![]);
        assert!(headerless.coinbase().is_none());
    }
}
