//! Core chain data types: hashes, outpoints, transactions, blocks.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::EncodingError;

/// Satoshi amount.
pub type Amount = u64;

/// A 256-bit hash stored in natural (hash-output) byte order.
///
/// Display and hex conversion use the reversed byte order that Bitcoin
/// tooling shows ("RPC byte order"), so a block hash that meets its target
/// prints with leading zeros. All internal structures and wire
/// serialization use the natural order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash, used as the genesis parent and coinbase prevout.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Hex in display (reversed) byte order.
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// Parse hex in display (reversed) byte order.
    pub fn from_hex(s: &str) -> Result<Self, EncodingError> {
        let bytes = hex::decode(s).map_err(|_| EncodingError::InvalidHex(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(EncodingError::InvalidHex(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        arr.reverse();
        Ok(Hash256(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(D::Error::custom)
    }
}

/// The 20-byte hash160 of a public key.
///
/// This is the value UTXO lookups and wallet balances key on. It is a
/// distinct type from [`Address`](crate::keys::Address) (the Base58Check
/// display form) so the two encodings cannot be confused at a call site.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKeyHash(pub [u8; 20]);

impl PubKeyHash {
    /// The all-zero hash, used as a burn/test recipient.
    pub const ZERO: PubKeyHash = PubKeyHash([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        PubKeyHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, EncodingError> {
        let bytes = hex::decode(s).map_err(|_| EncodingError::InvalidHex(s.to_string()))?;
        if bytes.len() != 20 {
            return Err(EncodingError::InvalidHex(s.to_string()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(PubKeyHash(arr))
    }
}

impl fmt::Display for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKeyHash({})", self.to_hex())
    }
}

impl Serialize for PubKeyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PubKeyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PubKeyHash::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Reference to a specific transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u32) -> Self {
        OutPoint { txid, index }
    }

    /// The null outpoint carried by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            txid: Hash256::ZERO,
            index: 0xffff_ffff,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == 0xffff_ffff
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input: a previous output plus the unlocking script.
///
/// For the P2PKH template the signature script is the DER signature
/// immediately followed by the 33-byte compressed public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub signature_script: Vec<u8>,
    pub sequence: u32,
}

impl TransactionInput {
    pub fn new(prevout: OutPoint) -> Self {
        TransactionInput {
            prevout,
            signature_script: Vec::new(),
            sequence: 0xffff_ffff,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.prevout.is_null()
    }
}

/// A transaction output: a satoshi value locked to a public key hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Amount,
    pub script_pubkey: PubKeyHash,
}

impl TransactionOutput {
    pub fn new(value: Amount, script_pubkey: PubKeyHash) -> Self {
        TransactionOutput {
            value,
            script_pubkey,
        }
    }
}

/// A complete transaction.
///
/// The txid is the double SHA-256 of the wire serialization; the codec and
/// the operations live in [`crate::transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub locktime: u32,
}

/// The 80-byte block header.
///
/// Height is never stored in the header; the chain derives it from the
/// parent link on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// A block: header plus ordered transaction list, coinbase first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}
