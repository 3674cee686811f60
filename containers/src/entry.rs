use crate::{block_proof, BlockHeader, Bytes32, CompactError, DecodeError, Height, HEADER_SIZE};
use ethereum_types::U256;

/// Serialized size of a [`HeaderEntry`]: header, height, cumulative work.
pub const ENTRY_SIZE: usize = HEADER_SIZE + 8 + 32;

/// A block header together with its position on the chain.
///
/// Entries are immutable once persisted. `hash` is cached so lookups and
/// linkage checks never rehash the header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    pub hash: Bytes32,
    pub header: BlockHeader,
    pub height: Height,
    /// Accumulated proof of work from the chain root up to and including this entry.
    pub chain_work: U256,
}

impl HeaderEntry {
    /// Entry for a chain-starting header at height 0.
    pub fn genesis(header: BlockHeader) -> Result<Self, CompactError> {
        let chain_work = block_proof(header.bits)?;
        Ok(Self {
            hash: header.hash(),
            header,
            height: Height::GENESIS,
            chain_work,
        })
    }

    /// Entry for `header` placed directly on top of `self`.
    ///
    /// Does not check that `header.prev_hash` points at `self`; callers
    /// validate linkage before persisting.
    pub fn child(&self, header: BlockHeader) -> Result<Self, CompactError> {
        let proof = block_proof(header.bits)?;
        Ok(Self {
            hash: header.hash(),
            header,
            height: self.height.next(),
            chain_work: self.chain_work.saturating_add(proof),
        })
    }

    pub fn prev_hash(&self) -> Bytes32 {
        self.header.prev_hash
    }

    pub fn time(&self) -> u32 {
        self.header.time
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTRY_SIZE);
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.height.0.to_le_bytes());
        for limb in self.chain_work.0.iter().rev() {
            out.extend_from_slice(&limb.to_be_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != ENTRY_SIZE {
            return Err(DecodeError::Length {
                expected: ENTRY_SIZE,
                got: bytes.len(),
            });
        }
        let header = BlockHeader::decode(&bytes[..HEADER_SIZE])?;

        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + 8]);

        let work_bytes = &bytes[HEADER_SIZE + 8..];
        let mut limbs = [0u64; 4];
        for (index, chunk) in work_bytes.chunks_exact(8).enumerate() {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(chunk);
            limbs[3 - index] = u64::from_be_bytes(limb);
        }

        Ok(Self {
            hash: header.hash(),
            header,
            height: Height(u64::from_le_bytes(height)),
            chain_work: U256(limbs),
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, DecodeError> {
        let bytes = hex::decode(text.trim())?;
        Self::decode(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn regtest_genesis() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: Bytes32::zero(),
            merkle_root: "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
                .parse()
                .unwrap(),
            time: 1296688602,
            bits: 0x207fffff,
            nonce: 2,
        }
    }

    #[test]
    fn test_genesis_entry() {
        let entry = HeaderEntry::genesis(regtest_genesis()).unwrap();
        assert_eq!(entry.height, Height(0));
        assert_eq!(entry.chain_work, U256::from(2u64));
        assert_eq!(entry.hash, regtest_genesis().hash());
    }

    #[test]
    fn test_child_accumulates_work() {
        let genesis = HeaderEntry::genesis(regtest_genesis()).unwrap();
        let header = BlockHeader {
            prev_hash: genesis.hash,
            time: genesis.time() + 600,
            ..regtest_genesis()
        };
        let child = genesis.child(header).unwrap();
        assert_eq!(child.height, Height(1));
        assert_eq!(child.chain_work, U256::from(4u64));
        assert_eq!(child.prev_hash(), genesis.hash);
    }

    #[test]
    fn test_storage_encoding() {
        let mut entry = HeaderEntry::genesis(regtest_genesis()).unwrap();
        entry.height = Height(812_345);
        entry.chain_work = U256::from(0xdead_beefu64) << 130;

        let bytes = entry.encode();
        assert_eq!(bytes.len(), ENTRY_SIZE);
        assert_eq!(HeaderEntry::decode(&bytes).unwrap(), entry);
        assert_eq!(HeaderEntry::from_hex(&entry.to_hex()).unwrap(), entry);
    }

    #[test]
    fn test_decode_rejects_truncated_entry() {
        let entry = HeaderEntry::genesis(regtest_genesis()).unwrap();
        let bytes = entry.encode();
        assert!(matches!(
            HeaderEntry::decode(&bytes[..ENTRY_SIZE - 1]),
            Err(DecodeError::Length { .. })
        ));
    }
}
