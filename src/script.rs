//! The P2PKH script template.
//!
//! This is the only script form the chain supports: an output locks funds
//! to a 20-byte pubkey hash, and the spending input carries the DER
//! signature immediately followed by the 33-byte compressed public key.
//! DER is self-delimiting (`0x30 <len> ...`), so the concatenation parses
//! without a separator.

use crate::error::RuleError;
use crate::hashes::hash160;
use crate::keys::verify_signature;
use crate::types::{PubKeyHash, Transaction};

/// Length of a compressed SEC public key.
const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Build the unlocking script for a P2PKH input.
pub fn build_signature_script(signature_der: &[u8], pubkey_bytes: &[u8; 33]) -> Vec<u8> {
    let mut script = Vec::with_capacity(signature_der.len() + COMPRESSED_PUBKEY_LEN);
    script.extend_from_slice(signature_der);
    script.extend_from_slice(pubkey_bytes);
    script
}

/// Split a signature script into its DER signature and public key parts.
pub fn parse_signature_script(script: &[u8]) -> Result<(&[u8], &[u8]), RuleError> {
    if script.len() < 2 || script[0] != 0x30 {
        return Err(RuleError::MalformedScript(
            "missing DER sequence marker".to_string(),
        ));
    }
    let sig_len = script[1] as usize + 2;
    if script.len() < sig_len + COMPRESSED_PUBKEY_LEN {
        return Err(RuleError::MalformedScript(format!(
            "script of {} bytes too short for signature of {} bytes plus pubkey",
            script.len(),
            sig_len
        )));
    }
    let (signature, pubkey) = script.split_at(sig_len);
    if pubkey.len() != COMPRESSED_PUBKEY_LEN {
        return Err(RuleError::MalformedScript(format!(
            "trailing pubkey is {} bytes, expected {}",
            pubkey.len(),
            COMPRESSED_PUBKEY_LEN
        )));
    }
    if pubkey[0] != 0x02 && pubkey[0] != 0x03 {
        return Err(RuleError::MalformedScript(
            "pubkey is not in compressed SEC form".to_string(),
        ));
    }
    Ok((signature, pubkey))
}

/// Verify one input of a transaction against the output script it spends:
/// the embedded pubkey must hash to `expected`, and the signature must
/// cover the transaction's canonical sighash.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    expected: &PubKeyHash,
) -> Result<(), RuleError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(RuleError::InvalidSignature(input_index))?;
    let (signature, pubkey) = parse_signature_script(&input.signature_script)?;

    if hash160(pubkey) != *expected.as_bytes() {
        return Err(RuleError::MalformedScript(format!(
            "pubkey hash does not match output script {expected}"
        )));
    }

    let digest = tx.sighash();
    if !verify_signature(&digest, signature, pubkey) {
        return Err(RuleError::InvalidSignature(input_index));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use crate::types::{Hash256, OutPoint, TransactionInput, TransactionOutput};

    fn signed_tx(keypair: &KeyPair) -> Transaction {
        let mut tx = Transaction::new(
            vec![TransactionInput::new(OutPoint::new(
                Hash256::from_bytes([1u8; 32]),
                0,
            ))],
            vec![TransactionOutput::new(1000, PubKeyHash::from_bytes([2u8; 20]))],
        );
        let signature = keypair.sign(&tx.sighash());
        tx.inputs[0].signature_script =
            build_signature_script(&signature, &keypair.public_key_bytes());
        tx
    }

    #[test]
    fn signed_input_verifies() {
        let keypair = KeyPair::generate();
        let tx = signed_tx(&keypair);
        verify_input(&tx, 0, &keypair.pubkey_hash()).unwrap();
    }

    #[test]
    fn wrong_recipient_hash_is_rejected() {
        let keypair = KeyPair::generate();
        let other = KeyPair::generate();
        let tx = signed_tx(&keypair);
        assert!(matches!(
            verify_input(&tx, 0, &other.pubkey_hash()),
            Err(RuleError::MalformedScript(_))
        ));
    }

    #[test]
    fn tampered_output_invalidates_signature() {
        let keypair = KeyPair::generate();
        let mut tx = signed_tx(&keypair);
        tx.outputs[0].value += 1;
        assert_eq!(
            verify_input(&tx, 0, &keypair.pubkey_hash()),
            Err(RuleError::InvalidSignature(0))
        );
    }

    #[test]
    fn signature_from_wrong_key_fails() {
        let keypair = KeyPair::generate();
        let wrong = KeyPair::generate();
        let mut tx = signed_tx(&keypair);
        // Re-sign with the wrong key but keep the right pubkey.
        let signature = wrong.sign(&tx.sighash());
        tx.inputs[0].signature_script =
            build_signature_script(&signature, &keypair.public_key_bytes());
        assert_eq!(
            verify_input(&tx, 0, &keypair.pubkey_hash()),
            Err(RuleError::InvalidSignature(0))
        );
    }

    #[test]
    fn parse_round_trip() {
        let keypair = KeyPair::generate();
        let digest = [7u8; 32];
        let signature = keypair.sign(&digest);
        let script = build_signature_script(&signature, &keypair.public_key_bytes());
        let (sig, pubkey) = parse_signature_script(&script).unwrap();
        assert_eq!(sig, &signature[..]);
        assert_eq!(pubkey, &keypair.public_key_bytes()[..]);
    }

    #[test]
    fn malformed_scripts_are_rejected() {
        assert!(parse_signature_script(&[]).is_err());
        assert!(parse_signature_script(&[0x30]).is_err());
        // Valid marker but no pubkey behind the signature.
        assert!(parse_signature_script(&[0x30, 0x02, 0x01, 0x01]).is_err());
        // Uncompressed pubkey prefix.
        let mut script = vec![0x30, 0x00];
        script.extend_from_slice(&[0x04; 33]);
        assert!(parse_signature_script(&script).is_err());
    }
}
