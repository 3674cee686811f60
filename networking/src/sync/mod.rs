/// Header synchronization for the header node.
///
/// The coordinator owns every mutation of the chain index. Peer sessions feed
/// it [`PeerEvent`](crate::PeerEvent)s over a queue; batches are validated and
/// applied strictly in arrival order. It includes:
///
/// - **Sync Coordinator**: the open/connect/sync lifecycle and batch validation
/// - **Chain Query**: read-only lookups and tip-change subscription for
///   wallets and indexers
///
/// ## Batch validation
///
/// Each header in a batch is checked, in order, for:
/// 1. Linkage to the previously accepted header
/// 2. Proof of work and timestamp rules of the network
/// 3. Conformance with the active checkpoint
///
/// The valid prefix is appended in one atomic write; everything after the
/// first failure is discarded and the peer session is dropped.
///
/// ## State Machine
///
/// - **CLOSED**: nothing attached
/// - **OPENING**: index initialized, no peer session
/// - **CONNECTING**: peer session attached, no request in flight
/// - **SYNCING**: requesting and applying header batches
/// - **IDLE**: caught up with the peer, waiting for announcements
pub mod config;
pub mod query;
pub mod service;
pub mod states;

pub use config::*;
pub use query::ChainQuery;
pub use service::{SyncCoordinator, SyncError, SyncStats};
pub use states::SyncState;

#[cfg(test)]
mod tests;
