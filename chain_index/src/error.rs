use containers::{Bytes32, Height};
use storage::StoreError;
use thiserror::Error;

use crate::validation::HeaderError;

#[derive(Debug, Error)]
pub enum ChainError {
    /// The entry does not extend the current tip.
    #[error("header {hash} at height {height} does not extend tip {tip}")]
    Linkage {
        height: Height,
        hash: Bytes32,
        tip: Bytes32,
    },
    /// A different entry already occupies the height. Signals a fork.
    #[error("conflicting entry at height {height}: have {existing}, got {incoming}")]
    Duplicate {
        height: Height,
        existing: Bytes32,
        incoming: Bytes32,
    },
    #[error("checkpoint violation at height {height}: expected {expected}, got {got}")]
    CheckpointViolation {
        height: Height,
        expected: Bytes32,
        got: Bytes32,
    },
    #[error("header {hash} at height {height} failed network rules: {reason}")]
    InvalidHeader {
        height: Height,
        hash: Bytes32,
        reason: HeaderError,
    },
    #[error("invalid fast-sync anchor: {0}")]
    InvalidAnchor(String),
    #[error("height {height} outside of [{root}, {tip}]")]
    Range {
        height: Height,
        root: Height,
        tip: Height,
    },
    #[error("chain index has no root")]
    NotInitialized,
    #[error("chain index corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ChainError {
    /// Faults caused by data a peer sent. The offending data is dropped and
    /// the node keeps running.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            ChainError::Linkage { .. }
                | ChainError::Duplicate { .. }
                | ChainError::CheckpointViolation { .. }
                | ChainError::InvalidHeader { .. }
        )
    }

    /// Faults after which the durability guarantee no longer holds.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::Storage(_) | ChainError::Corrupt(_))
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::Linkage { .. } => "linkage",
            ChainError::Duplicate { .. } => "duplicate",
            ChainError::CheckpointViolation { .. } => "checkpoint",
            ChainError::InvalidHeader { .. } => "invalid_header",
            ChainError::InvalidAnchor(_) => "invalid_anchor",
            ChainError::Range { .. } => "range",
            ChainError::NotInitialized => "not_initialized",
            ChainError::Corrupt(_) => "corrupt",
            ChainError::Storage(_) => "storage",
        }
    }
}
