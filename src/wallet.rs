//! A minimal wallet: key management, coin selection, transaction
//! building and signing.
//!
//! The wallet holds key pairs and reads chain state through the
//! coordinator's read-only views. Coin selection is largest-first over
//! *spendable* outputs only, so immature coinbase rewards are never
//! picked.

use std::collections::HashMap;
use tracing::debug;

use crate::chain::Blockchain;
use crate::error::WalletError;
use crate::keys::KeyPair;
use crate::script::build_signature_script;
use crate::types::{
    Amount, Hash256, OutPoint, PubKeyHash, Transaction, TransactionInput, TransactionOutput,
};
use crate::utxo::UtxoEntry;

/// Key ring plus transaction building against a chain.
#[derive(Debug, Default)]
pub struct Wallet {
    keys: HashMap<PubKeyHash, KeyPair>,
}

impl Wallet {
    pub fn new() -> Self {
        Wallet {
            keys: HashMap::new(),
        }
    }

    /// Generate a fresh key and return its pubkey hash.
    pub fn generate_key(&mut self) -> PubKeyHash {
        let keypair = KeyPair::generate();
        let pkh = keypair.pubkey_hash();
        self.keys.insert(pkh, keypair);
        pkh
    }

    pub fn pubkey_hashes(&self) -> Vec<PubKeyHash> {
        let mut hashes: Vec<PubKeyHash> = self.keys.keys().copied().collect();
        hashes.sort();
        hashes
    }

    pub fn owns(&self, pkh: &PubKeyHash) -> bool {
        self.keys.contains_key(pkh)
    }

    /// Confirmed balance across all wallet keys, including immature
    /// coinbase outputs.
    pub fn balance(&self, chain: &Blockchain) -> Amount {
        self.keys
            .keys()
            .map(|pkh| chain.balance_of(pkh))
            .sum()
    }

    /// Outputs the wallet could spend in the next block: owned, past
    /// coinbase maturity, and not already claimed by a pending mempool
    /// transaction.
    pub fn spendable_utxos(&self, chain: &Blockchain) -> Vec<(OutPoint, UtxoEntry)> {
        let next_height = chain.height() + 1;
        let maturity = chain.params().coinbase_maturity;
        let mut spendable: Vec<(OutPoint, UtxoEntry)> = Vec::new();
        for pkh in self.pubkey_hashes() {
            for (outpoint, entry) in chain.utxo().utxos_for(&pkh) {
                if entry.is_coinbase && next_height.saturating_sub(entry.height) < maturity {
                    continue;
                }
                if chain.mempool().spends_outpoint(&outpoint) {
                    continue;
                }
                spendable.push((outpoint, entry));
            }
        }
        spendable
    }

    /// Build and sign a transaction paying `amount` to `recipient` with
    /// the given fee, returning change to the first input's key.
    pub fn create_transaction(
        &self,
        chain: &Blockchain,
        recipient: PubKeyHash,
        amount: Amount,
        fee: Amount,
    ) -> Result<Transaction, WalletError> {
        let required = amount + fee;

        // Largest-first selection keeps input counts small.
        let mut candidates = self.spendable_utxos(chain);
        candidates.sort_by(|a, b| b.1.value.cmp(&a.1.value));

        let mut selected: Vec<(OutPoint, UtxoEntry)> = Vec::new();
        let mut gathered: Amount = 0;
        for (outpoint, entry) in candidates {
            if gathered >= required {
                break;
            }
            gathered += entry.value;
            selected.push((outpoint, entry));
        }
        if gathered < required {
            return Err(WalletError::InsufficientFunds {
                available: gathered,
                required,
            });
        }

        let change = gathered - required;
        let change_key = selected[0].1.script_pubkey;

        let inputs: Vec<TransactionInput> = selected
            .iter()
            .map(|(outpoint, _)| TransactionInput::new(*outpoint))
            .collect();
        let mut outputs = vec![TransactionOutput::new(amount, recipient)];
        if change > 0 {
            outputs.push(TransactionOutput::new(change, change_key));
        }

        let mut tx = Transaction::new(inputs, outputs);

        // One canonical sighash covers every input.
        let digest = tx.sighash();
        for (index, (_, entry)) in selected.iter().enumerate() {
            let keypair = self
                .keys
                .get(&entry.script_pubkey)
                .ok_or(WalletError::UnknownKey(entry.script_pubkey))?;
            let signature = keypair.sign(&digest);
            tx.inputs[index].signature_script =
                build_signature_script(&signature, &keypair.public_key_bytes());
        }

        debug!(
            txid = %tx.txid(),
            inputs = tx.inputs.len(),
            amount,
            fee,
            change,
            "built transaction"
        );
        Ok(tx)
    }

    /// Build, sign and submit a payment to the chain's mempool.
    pub fn send(
        &self,
        chain: &mut Blockchain,
        recipient: PubKeyHash,
        amount: Amount,
        fee: Amount,
    ) -> Result<Hash256, WalletError> {
        let tx = self.create_transaction(chain, recipient, amount, fee)?;
        Ok(chain.add_transaction(tx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ConsensusParams;

    fn mined_chain(wallet: &mut Wallet, blocks: u32) -> (Blockchain, PubKeyHash) {
        let mut chain = Blockchain::new(ConsensusParams::dev());
        let miner_key = wallet.generate_key();
        for _ in 0..blocks {
            chain.mine_next_block(miner_key).unwrap();
        }
        (chain, miner_key)
    }

    #[test]
    fn balance_tracks_mined_rewards() {
        let mut wallet = Wallet::new();
        let (chain, _) = mined_chain(&mut wallet, 3);
        assert_eq!(wallet.balance(&chain), 3 * 50_0000_0000);
    }

    #[test]
    fn spendable_excludes_immature_coinbase() {
        let mut wallet = Wallet::new();
        // Maturity is 5 in dev mode; mine exactly maturity blocks so only
        // the first coinbase is spendable at next height.
        let (chain, _) = mined_chain(&mut wallet, 5);
        let spendable = wallet.spendable_utxos(&chain);
        assert_eq!(spendable.len(), 1);
        assert_eq!(spendable[0].1.height, 1);
    }

    #[test]
    fn create_transaction_with_change() {
        let mut wallet = Wallet::new();
        let (chain, miner_key) = mined_chain(&mut wallet, 6);
        let recipient = PubKeyHash::from_bytes([9u8; 20]);

        let tx = wallet
            .create_transaction(&chain, recipient, 10_0000_0000, 10_000)
            .unwrap();
        assert_eq!(tx.outputs[0].value, 10_0000_0000);
        assert_eq!(tx.outputs[0].script_pubkey, recipient);
        // Change: 50 coins in, 10 out, fee 10k.
        assert_eq!(tx.outputs[1].value, 40_0000_0000 - 10_000);
        assert_eq!(tx.outputs[1].script_pubkey, miner_key);
    }

    #[test]
    fn insufficient_funds_is_reported() {
        let mut wallet = Wallet::new();
        let (chain, _) = mined_chain(&mut wallet, 6);
        let result = wallet.create_transaction(
            &chain,
            PubKeyHash::ZERO,
            1_000_0000_0000, // more than the two spendable coinbases
            0,
        );
        assert!(matches!(
            result,
            Err(WalletError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn sent_transaction_enters_mempool_and_confirms() {
        let mut wallet = Wallet::new();
        let (mut chain, miner_key) = mined_chain(&mut wallet, 6);
        let recipient = PubKeyHash::from_bytes([9u8; 20]);

        let txid = wallet
            .send(&mut chain, recipient, 10_0000_0000, 10_000)
            .unwrap();
        assert!(chain.mempool().contains(&txid));

        chain.mine_next_block(miner_key).unwrap();
        assert!(!chain.mempool().contains(&txid));
        assert_eq!(chain.balance_of(&recipient), 10_0000_0000);
    }
}
