//! Per-profile consensus parameters.
//!
//! A [`ConsensusParams`] value is constructed once when the coordinator is
//! created and passed by reference into the validator, the difficulty
//! function and the miner. Nothing in it is mutable afterwards, which keeps
//! difficulty adjustment a pure function of committed chain state and lets
//! tests run with independent parameter sets in parallel.

use serde::{Deserialize, Serialize};

/// Network profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Low difficulty, short retarget interval, 5-block maturity.
    Dev,
    /// Mainnet-like parameters.
    Prod,
}

/// Immutable chain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub mode: Mode,
    /// Maximum target (minimum difficulty) in compact form; also the
    /// genesis difficulty bits.
    pub max_target_bits: u32,
    /// Blocks per difficulty adjustment interval.
    pub adjustment_interval: u32,
    /// Target seconds between blocks.
    pub target_block_time_secs: u32,
    /// Confirmations before a coinbase output may be spent.
    pub coinbase_maturity: u32,
}

impl ConsensusParams {
    /// Development profile: blocks mine in milliseconds on a laptop.
    pub fn dev() -> Self {
        ConsensusParams {
            mode: Mode::Dev,
            max_target_bits: 0x1f0f_ffff,
            adjustment_interval: 10,
            target_block_time_secs: 5,
            coinbase_maturity: 5,
        }
    }

    /// Production profile with Bitcoin mainnet values.
    pub fn prod() -> Self {
        ConsensusParams {
            mode: Mode::Prod,
            max_target_bits: 0x1d00_ffff,
            adjustment_interval: 2016,
            target_block_time_secs: 600,
            coinbase_maturity: 100,
        }
    }

    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Dev => Self::dev(),
            Mode::Prod => Self::prod(),
        }
    }

    /// Ideal total seconds for one adjustment interval.
    pub fn target_timespan_secs(&self) -> u64 {
        self.adjustment_interval as u64 * self.target_block_time_secs as u64
    }
}
