//! Hash primitives: SHA-256, double SHA-256 and hash160.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Double SHA-256, the hash used for txids, block hashes and checksums.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// RIPEMD-160(SHA-256(data)), the 20-byte hash behind P2PKH.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn double_sha256_hello() {
        // SHA256(SHA256("hello"))
        assert_eq!(
            hex::encode(double_sha256(b"hello")),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn hash160_is_twenty_bytes_and_deterministic() {
        let a = hash160(b"some pubkey bytes");
        let b = hash160(b"some pubkey bytes");
        assert_eq!(a, b);
        assert_ne!(a, hash160(b"other"));
    }
}
