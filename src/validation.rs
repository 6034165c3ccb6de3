//! The block and transaction validation pipeline.
//!
//! `validate_block` runs every consensus rule in cheap-first order against
//! the parent chain's context. When the caller cannot supply a UTXO view
//! (a block arriving on a side branch), the UTXO-dependent rules are
//! deferred; the reorganization rewind runs them before such a branch can
//! become the best chain.

use std::collections::HashSet;
use tracing::debug;

use crate::constants::{MAX_BLOCK_SIZE, MAX_FUTURE_BLOCK_TIME, MAX_MONEY, MEDIAN_TIME_SPAN};
use crate::difficulty::{block_reward, expected_bits, median_time};
use crate::error::RuleError;
use crate::params::ConsensusParams;
use crate::script;
use crate::types::{Amount, Block, OutPoint, Transaction};
use crate::utxo::UtxoSet;
use crate::view::ChainView;

/// Validate a candidate block at `height` whose parent is already stored.
///
/// Checks, in order:
/// 1. Proof of work against the header's own bits.
/// 2. Bits match the expected difficulty for this branch and height.
/// 3. Timestamp strictly after the median of the last 11 ancestors
///    (all available ones below height 11).
/// 4. Timestamp at most two hours ahead of `now`.
/// 5. Serialized size within the block size limit.
/// 6. First transaction is the only coinbase.
/// 7. With a UTXO view: every non-coinbase transaction validates and the
///    coinbase claims at most subsidy plus fees.
/// 8. Merkle root matches the transaction list.
/// 9. No duplicate txids.
///
/// Returns the total fees collected by the block (zero without a UTXO
/// view).
pub fn validate_block(
    block: &Block,
    height: u32,
    view: &dyn ChainView,
    utxo: Option<&UtxoSet>,
    params: &ConsensusParams,
    now: u32,
) -> Result<Amount, RuleError> {
    let header = &block.header;

    // 1. Proof of work.
    if !header.meets_difficulty_target() {
        return Err(RuleError::InvalidPoW);
    }

    // 2. Difficulty schedule.
    let expected = expected_bits(view, &header.prev_block_hash, height, params)?;
    if header.bits != expected {
        return Err(RuleError::InvalidDifficulty {
            got: header.bits,
            expected,
        });
    }

    // 3. Median time past, over however many ancestors exist.
    let timestamps = view.ancestor_timestamps(&header.prev_block_hash, MEDIAN_TIME_SPAN);
    if !timestamps.is_empty() {
        let median = median_time(&timestamps);
        if header.timestamp <= median {
            return Err(RuleError::InvalidTimestamp(format!(
                "timestamp {} is not after median time past {median}",
                header.timestamp
            )));
        }
    }

    // 4. Future drift window.
    if header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
        return Err(RuleError::InvalidTimestamp(format!(
            "timestamp {} is more than {MAX_FUTURE_BLOCK_TIME}s ahead of {now}",
            header.timestamp
        )));
    }

    // 5. Size limit.
    let size = block.serialized_size();
    if size > MAX_BLOCK_SIZE {
        return Err(RuleError::BlockTooLarge {
            size,
            max: MAX_BLOCK_SIZE,
        });
    }

    // 6. Coinbase placement.
    let Some(first) = block.transactions.first() else {
        return Err(RuleError::BadCoinbase("block has no transactions".to_string()));
    };
    if !first.is_coinbase() {
        return Err(RuleError::BadCoinbase(
            "first transaction is not a coinbase".to_string(),
        ));
    }
    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            return Err(RuleError::BadCoinbase(format!(
                "transaction at index {i} is a second coinbase"
            )));
        }
    }

    // 7. Transaction validation against a working copy of the parent UTXO
    // view, tracking intra-block spends.
    let mut total_fees: Amount = 0;
    if let Some(utxo) = utxo {
        let mut working = utxo.clone();
        let mut spent_in_block: HashSet<OutPoint> = HashSet::new();

        for tx in block.transactions.iter().skip(1) {
            let fee = validate_transaction(tx, &working, &spent_in_block, height, params)?;
            total_fees = total_fees.checked_add(fee).ok_or(RuleError::OutputOverflow)?;

            for input in &tx.inputs {
                working.remove(&input.prevout)?;
                spent_in_block.insert(input.prevout);
            }
            let txid = tx.txid();
            for (index, output) in tx.outputs.iter().enumerate() {
                working.insert(
                    OutPoint::new(txid, index as u32),
                    crate::utxo::UtxoEntry {
                        value: output.value,
                        script_pubkey: output.script_pubkey,
                        height,
                        is_coinbase: false,
                    },
                )?;
            }
        }

        let max_claim = block_reward(height)
            .checked_add(total_fees)
            .ok_or(RuleError::OutputOverflow)?;
        if first.total_output() > max_claim {
            return Err(RuleError::BadCoinbase(format!(
                "coinbase claims {} satoshi, at most {max_claim} allowed",
                first.total_output()
            )));
        }
    }

    // 8. Merkle commitment.
    let txids = block.txids();
    if crate::merkle::merkle_root(&txids) != header.merkle_root {
        return Err(RuleError::BadMerkleRoot);
    }

    // 9. Duplicate txids.
    let mut seen = HashSet::with_capacity(txids.len());
    for txid in &txids {
        if !seen.insert(*txid) {
            return Err(RuleError::DuplicateTransaction(*txid));
        }
    }

    debug!(
        height,
        txs = block.transactions.len(),
        fees = total_fees,
        "block passed validation"
    );
    Ok(total_fees)
}

/// Validate a single non-coinbase transaction against a UTXO view.
///
/// `spent` carries the outpoints already consumed earlier in the same
/// block (or by the mempool) so conflicts surface as `DoubleSpend` rather
/// than `MissingUtxo`. Returns the transaction fee.
pub fn validate_transaction(
    tx: &Transaction,
    utxo: &UtxoSet,
    spent: &HashSet<OutPoint>,
    height: u32,
    params: &ConsensusParams,
) -> Result<Amount, RuleError> {
    if tx.is_coinbase() {
        return Err(RuleError::BadCoinbase(
            "coinbase cannot be validated as a standalone transaction".to_string(),
        ));
    }
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(RuleError::EmptyTransaction);
    }

    // Inputs: exist, unspent, mature.
    let mut total_in: Amount = 0;
    let mut seen_inputs: HashSet<OutPoint> = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if spent.contains(&input.prevout) || !seen_inputs.insert(input.prevout) {
            return Err(RuleError::DoubleSpend(input.prevout));
        }
        let entry = utxo
            .get(&input.prevout)
            .ok_or(RuleError::MissingUtxo(input.prevout))?;

        if entry.is_coinbase {
            let confirmations = height.saturating_sub(entry.height);
            if confirmations < params.coinbase_maturity {
                return Err(RuleError::ImmatureCoinbase {
                    confirmations,
                    required: params.coinbase_maturity,
                });
            }
        }
        total_in = total_in
            .checked_add(entry.value)
            .ok_or(RuleError::OutputOverflow)?;
    }

    // Outputs: bounded individually and in total.
    let mut total_out: Amount = 0;
    for output in &tx.outputs {
        if output.value > MAX_MONEY {
            return Err(RuleError::OutputOverflow);
        }
        total_out = total_out
            .checked_add(output.value)
            .ok_or(RuleError::OutputOverflow)?;
    }
    if total_out > MAX_MONEY {
        return Err(RuleError::OutputOverflow);
    }

    // Conservation of value.
    let fee = total_in
        .checked_sub(total_out)
        .ok_or(RuleError::OutputOverflow)?;

    // Script check: every input unlocks the output it spends.
    for (index, input) in tx.inputs.iter().enumerate() {
        let entry = utxo
            .get(&input.prevout)
            .ok_or(RuleError::MissingUtxo(input.prevout))?;
        script::verify_input(tx, index, &entry.script_pubkey)?;
    }

    Ok(fee)
}
