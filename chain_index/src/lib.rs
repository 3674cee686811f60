//! Durable, height- and hash-addressable header chain.
//!
//! - **ChainIndex**: persistent header entries plus the tip and root pointers
//! - **CheckpointPolicy**: the single active trusted checkpoint and the
//!   retention floor it implies
//! - **FastSyncAnchor**: a consecutive `(prev, tip)` pair that roots the index
//!   somewhere other than genesis
//! - **validation**: proof-of-work and timestamp sanity for candidate headers

pub mod anchor;
pub mod checkpoint;
pub mod error;
pub mod index;
pub mod validation;
mod verify;

pub use anchor::FastSyncAnchor;
pub use checkpoint::CheckpointPolicy;
pub use error::ChainError;
pub use index::{ChainIndex, IndexSnapshot, MAX_LOCATOR_HASHES};
pub use validation::{check_header, HeaderError, MedianTimeWindow};
