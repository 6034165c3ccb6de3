//! Wire-format building blocks: varints, a byte cursor, Base58Check and
//! hex serde helpers.
//!
//! All integers on the wire are little-endian. Hex output is lowercase and
//! input is case-insensitive (the `hex` crate guarantees both).

use crate::error::EncodingError;
use crate::hashes::double_sha256;

/// Encode a Bitcoin variable-length integer.
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(value as u16).to_le_bytes());
        out
    } else if value <= 0xffff_ffff {
        let mut out = vec![0xfe];
        out.extend_from_slice(&(value as u32).to_le_bytes());
        out
    } else {
        let mut out = vec![0xff];
        out.extend_from_slice(&value.to_le_bytes());
        out
    }
}

/// Forward-only cursor over a byte slice used by the deserializers.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fails with [`EncodingError::TrailingBytes`] unless the input was
    /// fully consumed.
    pub fn finish(self) -> Result<(), EncodingError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(EncodingError::TrailingBytes(self.data.len() - self.pos))
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], EncodingError> {
        if self.remaining() < len {
            return Err(EncodingError::UnexpectedEnd(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], EncodingError> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, EncodingError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, EncodingError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, EncodingError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, EncodingError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64, EncodingError> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16_le()? as u64),
            0xfe => Ok(self.read_u32_le()? as u64),
            0xff => self.read_u64_le(),
            prefix => Ok(prefix as u64),
        }
    }
}

/// Base58Check-encode `payload` under a version byte: the checksum is the
/// first four bytes of `double_sha256(version || payload)`.
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 5);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode a Base58Check string into its version byte and payload,
/// verifying the checksum.
pub fn base58check_decode(encoded: &str) -> Result<(u8, Vec<u8>), EncodingError> {
    let data = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| EncodingError::InvalidBase58)?;
    if data.len() < 5 {
        return Err(EncodingError::InvalidBase58);
    }
    let (body, checksum) = data.split_at(data.len() - 4);
    let expected = double_sha256(body);
    if checksum != &expected[..4] {
        return Err(EncodingError::BadChecksum);
    }
    Ok((body[0], body[1..].to_vec()))
}

/// Serde adapter serializing `Vec<u8>` fields as lowercase hex strings.
pub mod hex_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_boundaries() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(0xfc), vec![0xfc]);
        assert_eq!(encode_varint(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(encode_varint(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(encode_varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(encode_varint(u64::MAX).len(), 9);
    }

    #[test]
    fn varint_round_trip() {
        for value in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, u64::MAX] {
            let encoded = encode_varint(value);
            let mut reader = ByteReader::new(&encoded);
            assert_eq!(reader.read_varint().unwrap(), value);
            reader.finish().unwrap();
        }
    }

    #[test]
    fn reader_rejects_truncated_input() {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        assert!(matches!(
            reader.read_u32_le(),
            Err(EncodingError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn reader_flags_trailing_bytes() {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        reader.read_u8().unwrap();
        assert_eq!(reader.finish(), Err(EncodingError::TrailingBytes(1)));
    }

    #[test]
    fn base58check_round_trip() {
        let payload = [0x42u8; 20];
        let encoded = base58check_encode(0x00, &payload);
        let (version, decoded) = base58check_decode(&encoded).unwrap();
        assert_eq!(version, 0x00);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn base58check_detects_corruption() {
        let encoded = base58check_encode(0x00, &[0x42u8; 20]);
        // Flip one character; '1' and '2' are both in the alphabet.
        let corrupted = if encoded.ends_with('1') {
            format!("{}2", &encoded[..encoded.len() - 1])
        } else {
            format!("{}1", &encoded[..encoded.len() - 1])
        };
        assert!(matches!(
            base58check_decode(&corrupted),
            Err(EncodingError::BadChecksum) | Err(EncodingError::InvalidBase58)
        ));
    }

    #[test]
    fn base58check_known_address_vector() {
        // hash160 of all zero bytes under version 0x00 is the well-known
        // "burn" address.
        let encoded = base58check_encode(0x00, &[0u8; 20]);
        assert_eq!(encoded, "1111111111111111111114oLvT2");
    }
}
