//! # chaincore
//!
//! An educational Bitcoin-compatible chain core: proof-of-work consensus,
//! a UTXO ledger, a fee-ordered mempool and fork-aware chain management,
//! all in memory and without networking.
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//! - primitives: [`hashes`], [`encoding`], [`keys`], [`merkle`]
//! - data model and codecs: [`types`], [`transaction`], [`block`]
//! - consensus: [`pow`], [`difficulty`], [`script`], [`validation`]
//! - state: [`utxo`], [`mempool`]
//! - coordination: [`chain`], [`mining`], [`view`], [`snapshot`], [`wallet`]
//!
//! The coordinator ([`chain::Blockchain`]) owns all mutable state. The
//! validator, difficulty schedule and miner reach it only through the
//! narrow [`view::ChainView`] and [`view::BlockSink`] interfaces, and all
//! consensus parameters live in one immutable [`params::ConsensusParams`]
//! value fixed at construction.
//!
//! ## Example
//!
//! ```
//! use chaincore::{Blockchain, ConsensusParams, PubKeyHash};
//!
//! let mut chain = Blockchain::new(ConsensusParams::dev());
//! let recipient = PubKeyHash::ZERO;
//!
//! let block = chain.mine_next_block(recipient).unwrap();
//! assert_eq!(chain.height(), 1);
//! assert_eq!(chain.best_tip(), block.hash());
//! assert_eq!(chain.balance_of(&recipient), 2 * 50_0000_0000); // genesis + block 1
//! ```

pub mod block;
pub mod chain;
pub mod constants;
pub mod difficulty;
pub mod encoding;
pub mod error;
pub mod hashes;
pub mod keys;
pub mod mempool;
pub mod merkle;
pub mod mining;
pub mod params;
pub mod pow;
pub mod script;
pub mod snapshot;
pub mod transaction;
pub mod types;
pub mod utxo;
pub mod validation;
pub mod view;
pub mod wallet;

pub use chain::Blockchain;
pub use error::{
    EncodingError, MempoolError, RuleError, ValidationError, WalletError,
};
pub use keys::{Address, KeyPair};
pub use mempool::Mempool;
pub use mining::{BlockTemplate, Miner};
pub use params::{ConsensusParams, Mode};
pub use types::{
    Amount, Block, BlockHeader, Hash256, OutPoint, PubKeyHash, Transaction, TransactionInput,
    TransactionOutput,
};
pub use utxo::{UtxoEntry, UtxoSet};
pub use view::{BlockSink, ChainView};
pub use wallet::Wallet;
