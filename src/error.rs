//! Error types, one sum type per boundary.
//!
//! Consensus rule checks return granular [`RuleError`]s; the coordinator
//! aggregates them into [`ValidationError`] with the offending block hash
//! attached. The mempool and wallet surfaces have their own types. None of
//! these paths panic on user input; invariants that cannot be violated
//! without a coordinator bug abort the process instead.

use thiserror::Error;

use crate::types::{Hash256, OutPoint};

/// Failures of byte-level codecs: hex, varint framing, Base58Check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),

    #[error("trailing bytes after deserialization: {0} left")]
    TrailingBytes(usize),

    #[error("invalid base58 string")]
    InvalidBase58,

    #[error("base58check checksum mismatch")]
    BadChecksum,

    #[error("unsupported script length {0}, expected a 20-byte pubkey hash")]
    UnsupportedScript(usize),

    #[error("secret key out of range")]
    InvalidSecretKey,
}

/// A violated consensus rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("proof of work: header hash exceeds target")]
    InvalidPoW,

    #[error("difficulty bits {got:#010x} do not match expected {expected:#010x}")]
    InvalidDifficulty { got: u32, expected: u32 },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("block size {size} exceeds maximum {max} bytes")]
    BlockTooLarge { size: usize, max: usize },

    #[error("merkle root in header does not match transactions")]
    BadMerkleRoot,

    #[error("bad coinbase: {0}")]
    BadCoinbase(String),

    #[error("duplicate transaction {0} within block")]
    DuplicateTransaction(Hash256),

    #[error("referenced utxo {0} does not exist")]
    MissingUtxo(OutPoint),

    #[error("utxo {0} already exists")]
    DuplicateUtxo(OutPoint),

    #[error("double spend of {0}")]
    DoubleSpend(OutPoint),

    #[error("coinbase output spent with {confirmations} confirmations, {required} required")]
    ImmatureCoinbase { confirmations: u32, required: u32 },

    #[error("output value overflow")]
    OutputOverflow,

    #[error("malformed signature script: {0}")]
    MalformedScript(String),

    #[error("signature verification failed for input {0}")]
    InvalidSignature(usize),

    #[error("transaction must have at least one input and one output")]
    EmptyTransaction,

    #[error("required ancestor of {0} is not stored")]
    MissingAncestor(Hash256),
}

/// Block rejection reasons surfaced by the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("block {0} already known")]
    DuplicateBlock(Hash256),

    #[error("orphan block: parent {0} not found")]
    OrphanBlock(Hash256),

    #[error("block {hash} rejected: {rule}")]
    InvalidBlock {
        hash: Hash256,
        #[source]
        rule: RuleError,
    },

    #[error("reorganization to {new_tip} aborted: {rule}")]
    InvalidReorg {
        new_tip: Hash256,
        #[source]
        rule: RuleError,
    },
}

/// Mempool rejection reasons.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction {0} already in mempool")]
    DuplicateTransaction(Hash256),

    #[error("coinbase transactions are not accepted into the mempool")]
    Coinbase,

    #[error("input {0} conflicts with an existing mempool spend")]
    DoubleSpend(OutPoint),

    #[error("mempool is full ({len}/{max} transactions)")]
    Full { len: usize, max: usize },

    #[error("transaction rejected: {0}")]
    Invalid(#[from] RuleError),
}

/// Wallet-side failures building or signing transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("insufficient spendable funds: have {available}, need {required} satoshi")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("no key in this wallet for {0}")]
    UnknownKey(crate::types::PubKeyHash),

    #[error(transparent)]
    Mempool(#[from] MempoolError),
}
