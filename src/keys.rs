//! secp256k1 key pairs, ECDSA signing and address derivation.
//!
//! Public keys use the 33-byte compressed SEC encoding exclusively; the
//! hash160 that ends up in output scripts is always computed over the
//! compressed form. Signing is deterministic (RFC 6979) via the secp256k1
//! crate, over a 32-byte digest the caller supplies.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;

use crate::encoding::{base58check_decode, base58check_encode};
use crate::error::EncodingError;
use crate::hashes::hash160;
use crate::types::PubKeyHash;

/// Version byte for mainnet P2PKH addresses.
pub const ADDRESS_VERSION: u8 = 0x00;

/// A secp256k1 key pair.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        KeyPair { secret, public }
    }

    /// Rebuild a key pair from a raw 32-byte secret.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, EncodingError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| EncodingError::InvalidSecretKey)?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(KeyPair { secret, public })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Compressed 33-byte SEC encoding of the public key.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public.serialize()
    }

    pub fn pubkey_hash(&self) -> PubKeyHash {
        PubKeyHash::from_bytes(hash160(&self.public_key_bytes()))
    }

    pub fn address(&self) -> Address {
        Address::from_pubkey_hash(&self.pubkey_hash())
    }

    /// Sign a 32-byte digest, returning the DER-encoded signature.
    pub fn sign(&self, digest: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let message = Message::from_digest(*digest);
        secp.sign_ecdsa(&message, &self.secret)
            .serialize_der()
            .to_vec()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret.
        write!(f, "KeyPair({})", self.address())
    }
}

/// Verify a DER signature over a 32-byte digest against a compressed
/// public key. Malformed signatures or keys verify as false.
pub fn verify_signature(digest: &[u8; 32], signature_der: &[u8], pubkey_bytes: &[u8]) -> bool {
    let Ok(pubkey) = PublicKey::from_slice(pubkey_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(signature_der) else {
        return false;
    };
    let secp = Secp256k1::verification_only();
    let message = Message::from_digest(*digest);
    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// hash160 of a serialized public key.
pub fn pubkey_to_hash160(pubkey_bytes: &[u8]) -> PubKeyHash {
    PubKeyHash::from_bytes(hash160(pubkey_bytes))
}

/// A Base58Check mainnet P2PKH address.
///
/// This is a display form only: chain state keys on [`PubKeyHash`], and
/// the conversion happens at the edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn from_pubkey_hash(pkh: &PubKeyHash) -> Self {
        Address(base58check_encode(ADDRESS_VERSION, pkh.as_bytes()))
    }

    /// Parse and checksum-verify an address string.
    pub fn parse(s: &str) -> Result<Self, EncodingError> {
        let (version, payload) = base58check_decode(s)?;
        if version != ADDRESS_VERSION || payload.len() != 20 {
            return Err(EncodingError::InvalidBase58);
        }
        Ok(Address(s.to_string()))
    }

    /// Recover the pubkey hash this address encodes.
    pub fn pubkey_hash(&self) -> PubKeyHash {
        // Construction and parse both verified the payload shape.
        let (_, payload) = base58check_decode(&self.0).expect("address payload verified at construction");
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&payload);
        PubKeyHash::from_bytes(bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
