use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position of a header on the chain, counted from genesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Height(pub u64);

impl PartialOrd for Height {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Height {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Height {
    pub const GENESIS: Height = Height(0);

    pub fn next(self) -> Height {
        Height(self.0 + 1)
    }

    /// The child height, or `None` when `self` is the largest height.
    pub fn checked_next(self) -> Option<Height> {
        self.0.checked_add(1).map(Height)
    }

    /// The parent height, or `None` at genesis.
    pub fn prev(self) -> Option<Height> {
        self.0.checked_sub(1).map(Height)
    }

    /// Fixed-width key used by the height index. Big-endian so that the
    /// store's byte ordering matches numeric ordering.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(bytes: &[u8]) -> Option<Height> {
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(Height(u64::from_be_bytes(array)))
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Height(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prev_at_genesis() {
        assert_eq!(Height::GENESIS.prev(), None);
        assert_eq!(Height(5).prev(), Some(Height(4)));
        assert_eq!(Height(5).next(), Height(6));
    }

    #[test]
    fn test_checked_next_at_limit() {
        assert_eq!(Height(5).checked_next(), Some(Height(6)));
        assert_eq!(Height(u64::MAX).checked_next(), None);
    }

    #[test]
    fn test_key_ordering_matches_numeric_ordering() {
        let low = Height(255).to_key();
        let high = Height(256).to_key();
        assert!(low < high);
        assert_eq!(Height::from_key(&high), Some(Height(256)));
        assert_eq!(Height::from_key(&[0u8; 4]), None);
    }
}
