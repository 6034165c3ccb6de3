//! Consensus constants shared by both network profiles.

/// Maximum money supply: 21,000,000 coins in satoshi.
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Satoshi per coin.
pub const SATOSHIS_PER_COIN: u64 = 100_000_000;

/// Maximum serialized block size in bytes (legacy 1 MB limit).
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Blocks between reward halvings.
pub const HALVING_INTERVAL: u32 = 210_000;

/// Initial block subsidy: 50 coins.
pub const INITIAL_SUBSIDY: u64 = 50 * SATOSHIS_PER_COIN;

/// Ancestor timestamps used for the median-time-past rule.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Maximum seconds a block timestamp may run ahead of wall-clock time.
pub const MAX_FUTURE_BLOCK_TIME: u32 = 2 * 60 * 60;

/// Retarget clamp: the measured timespan is bounded to
/// `[expected / 4, expected * 4]` per adjustment.
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

/// Outputs below this value are flagged as dust (not rejected).
pub const DUST_THRESHOLD: u64 = 546;

/// Timestamp of the genesis block: 2009-01-03 18:15:05 UTC.
pub const GENESIS_TIMESTAMP: u32 = 1_231_006_505;

/// Default transaction capacity of the mempool.
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 5_000;

/// Sequence number marking a final input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;
