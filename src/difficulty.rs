//! Reward schedule, median time past and difficulty retargeting.
//!
//! `expected_bits` is a pure function of committed chain state: it reads
//! headers through a [`ChainView`] and the immutable parameters, never a
//! mutable field, so the miner and the validator always agree.

use num_bigint::BigUint;
use tracing::debug;

use crate::constants::{HALVING_INTERVAL, INITIAL_SUBSIDY, MAX_ADJUSTMENT_FACTOR};
use crate::error::RuleError;
use crate::params::ConsensusParams;
use crate::pow::{compact_from_target, target_from_compact};
use crate::types::{Amount, Hash256};
use crate::view::ChainView;

/// Block subsidy at `height`: 50 coins halved every 210,000 blocks.
pub fn block_reward(height: u32) -> Amount {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Whether `height` sits on a retarget boundary. Genesis never does.
pub fn is_adjustment_height(height: u32, interval: u32) -> bool {
    height > 0 && height % interval == 0
}

/// Lower median of a timestamp list (Bitcoin Core's integer behavior for
/// even counts).
pub fn median_time(timestamps: &[u32]) -> u32 {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        sorted[mid - 1]
    }
}

/// Retarget from the measured timespan of the last interval.
///
/// 1. `actual = last_timestamp - first_timestamp`, clamped into
///    `[expected / 4, expected * 4]`.
/// 2. `new_target = old_target * actual / expected`.
/// 3. Cap at the chain's maximum target, floor at 1.
pub fn next_target_bits(
    first_timestamp: u32,
    last_timestamp: u32,
    current_bits: u32,
    params: &ConsensusParams,
) -> u32 {
    let expected = params.target_timespan_secs();
    let actual = (last_timestamp as u64).saturating_sub(first_timestamp as u64);
    let actual = actual.clamp(expected / MAX_ADJUSTMENT_FACTOR, expected * MAX_ADJUSTMENT_FACTOR);

    let old_target = target_from_compact(current_bits);
    let mut new_target = old_target * BigUint::from(actual) / BigUint::from(expected);

    let max_target = target_from_compact(params.max_target_bits);
    if new_target > max_target {
        new_target = max_target;
    }
    if new_target == BigUint::from(0u32) {
        new_target = BigUint::from(1u32);
    }

    let bits = compact_from_target(&new_target);
    debug!(
        actual,
        expected,
        old_bits = format_args!("{current_bits:#010x}"),
        new_bits = format_args!("{bits:#010x}"),
        "difficulty retarget"
    );
    bits
}

/// The difficulty bits a block at `height` whose parent is `parent_hash`
/// must carry.
///
/// Off the adjustment boundary this is the parent's bits; on the boundary
/// it is recomputed from the timestamps spanning the previous interval on
/// the parent's own branch.
pub fn expected_bits(
    view: &dyn ChainView,
    parent_hash: &Hash256,
    height: u32,
    params: &ConsensusParams,
) -> Result<u32, RuleError> {
    if height == 0 {
        return Ok(params.max_target_bits);
    }
    let parent = view
        .header(parent_hash)
        .ok_or(RuleError::MissingAncestor(*parent_hash))?;

    if !is_adjustment_height(height, params.adjustment_interval) {
        return Ok(parent.bits);
    }

    // First block of the closing interval: height - interval, which is
    // interval - 1 parent links above the parent (at height - 1).
    let first_hash = view
        .ancestor(parent_hash, params.adjustment_interval - 1)
        .ok_or(RuleError::MissingAncestor(*parent_hash))?;
    let first = view
        .header(&first_hash)
        .ok_or(RuleError::MissingAncestor(first_hash))?;

    Ok(next_target_bits(
        first.timestamp,
        parent.timestamp,
        parent.bits,
        params,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_halves_on_schedule() {
        assert_eq!(block_reward(0), 50_0000_0000);
        assert_eq!(block_reward(209_999), 50_0000_0000);
        assert_eq!(block_reward(210_000), 25_0000_0000);
        assert_eq!(block_reward(420_000), 12_5000_0000);
        assert_eq!(block_reward(6_930_000), 0);
    }

    #[test]
    fn reward_is_zero_after_sixty_four_halvings() {
        assert_eq!(block_reward(64 * HALVING_INTERVAL), 0);
        assert_eq!(block_reward(u32::MAX), 0);
    }

    #[test]
    fn adjustment_heights() {
        assert!(!is_adjustment_height(0, 10));
        assert!(!is_adjustment_height(9, 10));
        assert!(is_adjustment_height(10, 10));
        assert!(!is_adjustment_height(11, 10));
        assert!(is_adjustment_height(2016, 2016));
    }

    #[test]
    fn median_time_lower_for_even_counts() {
        assert_eq!(median_time(&[1, 2, 3, 4, 5]), 3);
        assert_eq!(median_time(&[1, 2, 3, 4]), 2);
        assert_eq!(median_time(&[5, 1, 3, 2, 4]), 3);
        assert_eq!(median_time(&[7]), 7);
    }

    #[test]
    fn on_schedule_interval_keeps_bits() {
        let params = ConsensusParams::prod();
        let expected = params.target_timespan_secs() as u32;
        let bits = next_target_bits(1_000_000, 1_000_000 + expected, 0x1d00ffff, &params);
        assert_eq!(bits, 0x1d00ffff);
    }

    #[test]
    fn fast_interval_clamps_to_quarter() {
        // actual = expected / 8 clamps to expected / 4, so the target
        // shrinks by exactly 4x.
        let params = ConsensusParams::prod();
        let start_bits = 0x1c0fffff; // below the cap so shrinking is visible
        let expected = params.target_timespan_secs() as u32;
        let bits = next_target_bits(0, expected / 8, start_bits, &params);

        let old = target_from_compact(start_bits);
        let quarter = old / BigUint::from(4u32);
        assert_eq!(bits, compact_from_target(&quarter));
    }

    #[test]
    fn slow_interval_clamps_to_four_times() {
        let params = ConsensusParams::prod();
        let start_bits = 0x1a0fffff; // far from the cap
        let expected = params.target_timespan_secs() as u32;
        let bits = next_target_bits(0, expected * 10, start_bits, &params);

        let old = target_from_compact(start_bits);
        let four_times = old * BigUint::from(4u32);
        assert_eq!(bits, compact_from_target(&four_times));
    }

    #[test]
    fn target_never_exceeds_chain_maximum() {
        let params = ConsensusParams::dev();
        let expected = params.target_timespan_secs() as u32;
        // Already at the maximum and blocks were slow: stays capped.
        let bits = next_target_bits(0, expected * 100, params.max_target_bits, &params);
        assert_eq!(bits, params.max_target_bits);
    }
}
