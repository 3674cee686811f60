//! Compact target and chain-work arithmetic.

use crate::Bytes32;
use ethereum_types::U256;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompactError {
    #[error("compact target has negative sign bit")]
    Negative,
    #[error("compact target overflows 256-bit range")]
    Overflow,
}

pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let negative = (bits & 0x0080_0000) != 0;

    if size <= 3 {
        word >>= 8 * (3 - size);
    }
    if negative && word != 0 {
        return Err(CompactError::Negative);
    }

    if word != 0 {
        let overflow = size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32);
        if overflow {
            return Err(CompactError::Overflow);
        }
    }

    if size <= 3 {
        Ok(U256::from(word))
    } else {
        Ok(U256::from(word) << (8 * (size - 3)))
    }
}

/// Hash interpreted as a little-endian 256-bit integer must not exceed target.
pub fn hash_meets_target(hash: &Bytes32, target: &U256) -> bool {
    U256::from_little_endian(hash.as_bytes()) <= *target
}

/// Expected number of hashes needed to meet the target encoded by `bits`.
pub fn block_proof(bits: u32) -> Result<U256, CompactError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Ok(U256::zero());
    }
    let one = U256::from(1u64);
    Ok((!target / (target + one)) + one)
}
