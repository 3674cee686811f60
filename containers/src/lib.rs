pub mod types;
pub mod height;
pub mod header;
pub mod entry;
pub mod checkpoint;
pub mod pow;

pub use checkpoint::Checkpoint;
pub use entry::{HeaderEntry, ENTRY_SIZE};
pub use header::{sha256d, BlockHeader, DecodeError, HEADER_SIZE};
pub use height::Height;
pub use pow::{block_proof, compact_to_u256, hash_meets_target, CompactError};
pub use types::Bytes32;

pub use ethereum_types::U256;
