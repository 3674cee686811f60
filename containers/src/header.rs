use crate::Bytes32;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Serialized size of a block header on the wire.
pub const HEADER_SIZE: usize = 80;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub fn sha256d(data: &[u8]) -> Bytes32 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    Bytes32(out)
}

/// Proof-of-work block header in the Bitcoin-family 80-byte layout.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Bytes32,
    pub merkle_root: Bytes32,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != HEADER_SIZE {
            return Err(DecodeError::Length {
                expected: HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let word = |offset: usize| -> [u8; 4] {
            [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]
        };
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        Ok(Self {
            version: i32::from_le_bytes(word(0)),
            prev_hash: Bytes32(prev_hash),
            merkle_root: Bytes32(merkle_root),
            time: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, DecodeError> {
        let bytes = hex::decode(text.trim())?;
        Self::decode(&bytes)
    }

    /// Content digest of the header (double SHA-256 of the wire encoding).
    pub fn hash(&self) -> Bytes32 {
        sha256d(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn genesis_merkle_root() -> Bytes32 {
        "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
            .parse()
            .unwrap()
    }

    #[rstest]
    #[case(1231006505, 0x1d00ffff, 2083236893, "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f")]
    #[case(1296688602, 0x1d00ffff, 414098458, "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943")]
    #[case(1296688602, 0x207fffff, 2, "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206")]
    fn test_genesis_hashes(
        #[case] time: u32,
        #[case] bits: u32,
        #[case] nonce: u32,
        #[case] expected: &str,
    ) {
        let header = BlockHeader {
            version: 1,
            prev_hash: Bytes32::zero(),
            merkle_root: genesis_merkle_root(),
            time,
            bits,
            nonce,
        };
        assert_eq!(header.hash().to_string(), expected);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let header = BlockHeader {
            version: 0x2000_0000,
            prev_hash: Bytes32([3u8; 32]),
            merkle_root: Bytes32([9u8; 32]),
            time: 1_700_000_000,
            bits: 0x1703_4219,
            nonce: 42,
        };
        let bytes = header.encode();
        assert_eq!(BlockHeader::decode(&bytes).unwrap(), header);
        assert_eq!(BlockHeader::from_hex(&hex::encode(bytes)).unwrap(), header);
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let err = BlockHeader::decode(&[0u8; 79]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Length {
                expected: HEADER_SIZE,
                got: 79
            }
        );
    }
}
