//! Transaction wire codec, txids, coinbase construction and the sighash.
//!
//! Wire format (all integers little-endian):
//!
//! ```text
//! version          4 bytes
//! input count      varint
//! per input:       prev txid (32, natural order) | prev index (4)
//!                  | varint script len | script | sequence (4)
//! output count     varint
//! per output:      value (8) | varint script len | 20-byte pubkey hash
//! locktime         4 bytes
//! ```

use crate::constants::DUST_THRESHOLD;
use crate::encoding::{encode_varint, ByteReader};
use crate::error::{EncodingError, RuleError};
use crate::hashes::double_sha256;
use crate::types::{
    Amount, Hash256, OutPoint, PubKeyHash, Transaction, TransactionInput, TransactionOutput,
};
use crate::utxo::UtxoSet;

impl TransactionInput {
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.prevout.txid.as_bytes());
        out.extend_from_slice(&self.prevout.index.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.signature_script.len() as u64));
        out.extend_from_slice(&self.signature_script);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }

    pub fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, EncodingError> {
        let txid = Hash256::from_bytes(reader.read_array()?);
        let index = reader.read_u32_le()?;
        let script_len = reader.read_varint()? as usize;
        let signature_script = reader.read_bytes(script_len)?.to_vec();
        let sequence = reader.read_u32_le()?;
        Ok(TransactionInput {
            prevout: OutPoint::new(txid, index),
            signature_script,
            sequence,
        })
    }
}

impl TransactionOutput {
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&encode_varint(20));
        out.extend_from_slice(self.script_pubkey.as_bytes());
    }

    pub fn deserialize(reader: &mut ByteReader<'_>) -> Result<Self, EncodingError> {
        let value = reader.read_u64_le()?;
        let script_len = reader.read_varint()? as usize;
        // Only the P2PKH template (a bare 20-byte hash) is supported.
        if script_len != 20 {
            return Err(EncodingError::UnsupportedScript(script_len));
        }
        let script_pubkey = PubKeyHash::from_bytes(reader.read_array()?);
        Ok(TransactionOutput {
            value,
            script_pubkey,
        })
    }

    /// Whether this output is below the dust threshold. Dust is flagged,
    /// never rejected.
    pub fn is_dust(&self) -> bool {
        self.value < DUST_THRESHOLD
    }
}

impl Transaction {
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        Transaction {
            version: 1,
            inputs,
            outputs,
            locktime: 0,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for input in &self.inputs {
            input.serialize_into(&mut out);
        }
        out.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            output.serialize_into(&mut out);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4;
        size += encode_varint(self.inputs.len() as u64).len();
        for input in &self.inputs {
            size += 32 + 4 + 4;
            size += encode_varint(input.signature_script.len() as u64).len();
            size += input.signature_script.len();
        }
        size += encode_varint(self.outputs.len() as u64).len();
        size += self.outputs.len() * (8 + 1 + 20);
        size
    }

    pub fn deserialize_from(reader: &mut ByteReader<'_>) -> Result<Self, EncodingError> {
        let version = reader.read_u32_le()?;
        let input_count = reader.read_varint()? as usize;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            inputs.push(TransactionInput::deserialize(reader)?);
        }
        let output_count = reader.read_varint()? as usize;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(TransactionOutput::deserialize(reader)?);
        }
        let locktime = reader.read_u32_le()?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, EncodingError> {
        let mut reader = ByteReader::new(data);
        let tx = Self::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(tx)
    }

    /// Transaction id: double SHA-256 of the wire serialization.
    pub fn txid(&self) -> Hash256 {
        Hash256::from_bytes(double_sha256(&self.serialize()))
    }

    /// A coinbase transaction has exactly one input with the null prevout.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// The digest every input signature commits to: the transaction with
    /// all signature scripts cleared, serialized and double-hashed. One
    /// digest per transaction, deterministic regardless of signing order.
    pub fn sighash(&self) -> [u8; 32] {
        let mut unsigned = self.clone();
        for input in &mut unsigned.inputs {
            input.signature_script.clear();
        }
        double_sha256(&unsigned.serialize())
    }

    /// Fee against a UTXO view: inputs minus outputs. Zero for coinbase.
    pub fn fee(&self, utxo: &UtxoSet) -> Result<Amount, RuleError> {
        if self.is_coinbase() {
            return Ok(0);
        }
        let mut total_in: Amount = 0;
        for input in &self.inputs {
            let entry = utxo
                .get(&input.prevout)
                .ok_or(RuleError::MissingUtxo(input.prevout))?;
            total_in = total_in
                .checked_add(entry.value)
                .ok_or(RuleError::OutputOverflow)?;
        }
        total_in
            .checked_sub(self.total_output())
            .ok_or(RuleError::OutputOverflow)
    }

    /// Build the coinbase transaction for a block at `height`.
    ///
    /// The signature script carries the BIP34-style height push followed by
    /// an 8-byte little-endian extra nonce, so coinbase txids stay unique
    /// across nonce-space exhaustion.
    pub fn create_coinbase(
        height: u32,
        reward: Amount,
        recipient: PubKeyHash,
        extra_nonce: u64,
    ) -> Transaction {
        let height_bytes = encode_height(height);
        let mut script = Vec::with_capacity(1 + height_bytes.len() + 8);
        script.push(height_bytes.len() as u8);
        script.extend_from_slice(&height_bytes);
        script.extend_from_slice(&extra_nonce.to_le_bytes());

        let input = TransactionInput {
            prevout: OutPoint::null(),
            signature_script: script,
            sequence: 0xffff_ffff,
        };
        let output = TransactionOutput::new(reward, recipient);
        Transaction::new(vec![input], vec![output])
    }
}

/// Minimal little-endian encoding of a block height, one zero byte for
/// height zero.
fn encode_height(height: u32) -> Vec<u8> {
    if height == 0 {
        return vec![0x00];
    }
    let mut bytes = height.to_le_bytes().to_vec();
    while bytes.len() > 1 && bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction::new(
            vec![TransactionInput {
                prevout: OutPoint::new(Hash256::from_bytes([9u8; 32]), 1),
                signature_script: vec![0xde, 0xad, 0xbe, 0xef],
                sequence: 0xffff_fffe,
            }],
            vec![
                TransactionOutput::new(50_000, PubKeyHash::from_bytes([1u8; 20])),
                TransactionOutput::new(49_000, PubKeyHash::from_bytes([2u8; 20])),
            ],
        )
    }

    #[test]
    fn serialization_round_trip() {
        let tx = sample_tx();
        let bytes = tx.serialize();
        assert_eq!(bytes.len(), tx.serialized_size());
        assert_eq!(Transaction::deserialize(&bytes).unwrap(), tx);
    }

    #[test]
    fn deserialize_rejects_trailing_bytes() {
        let mut bytes = sample_tx().serialize();
        bytes.push(0x00);
        assert!(matches!(
            Transaction::deserialize(&bytes),
            Err(EncodingError::TrailingBytes(1))
        ));
    }

    #[test]
    fn txid_changes_with_content() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.outputs[0].value += 1;
        assert_ne!(tx.txid(), other.txid());
    }

    #[test]
    fn coinbase_shape() {
        let cb = Transaction::create_coinbase(42, 50_0000_0000, PubKeyHash::ZERO, 7);
        assert!(cb.is_coinbase());
        assert_eq!(cb.outputs.len(), 1);
        assert_eq!(cb.outputs[0].value, 50_0000_0000);
        // height push: [1, 42], then 8 bytes of extra nonce
        assert_eq!(cb.inputs[0].signature_script[0], 1);
        assert_eq!(cb.inputs[0].signature_script[1], 42);
        assert_eq!(cb.inputs[0].signature_script.len(), 2 + 8);
    }

    #[test]
    fn coinbase_txid_depends_on_extra_nonce() {
        let a = Transaction::create_coinbase(1, 50, PubKeyHash::ZERO, 0);
        let b = Transaction::create_coinbase(1, 50, PubKeyHash::ZERO, 1);
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn coinbase_txid_depends_on_height() {
        let a = Transaction::create_coinbase(1, 50, PubKeyHash::ZERO, 0);
        let b = Transaction::create_coinbase(2, 50, PubKeyHash::ZERO, 0);
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn height_encoding_is_minimal() {
        assert_eq!(encode_height(0), vec![0x00]);
        assert_eq!(encode_height(1), vec![0x01]);
        assert_eq!(encode_height(0x1234), vec![0x34, 0x12]);
        assert_eq!(encode_height(0x0100_0000), vec![0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn sighash_ignores_existing_signatures() {
        let tx = sample_tx();
        let mut signed = tx.clone();
        signed.inputs[0].signature_script = vec![0xaa; 71];
        assert_eq!(tx.sighash(), signed.sighash());
    }

    #[test]
    fn dust_threshold_flags_small_outputs() {
        assert!(TransactionOutput::new(545, PubKeyHash::ZERO).is_dust());
        assert!(!TransactionOutput::new(546, PubKeyHash::ZERO).is_dust());
    }

    #[test]
    fn output_script_must_be_twenty_bytes() {
        // value (8) + varint len 21 + 21 bytes is not a P2PKH template.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1000u64.to_le_bytes());
        bytes.push(21);
        bytes.extend_from_slice(&[0u8; 21]);
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            TransactionOutput::deserialize(&mut reader),
            Err(EncodingError::UnsupportedScript(21))
        ));
    }
}
