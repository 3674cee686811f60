pub mod sync;
pub mod types;

pub use sync::{ChainQuery, SyncCoordinator, SyncError, SyncState, SyncStats};
pub use types::{ConnectionState, PeerEvent, PeerSession, TipEvent};
