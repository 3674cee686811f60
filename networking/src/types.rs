use anyhow::Result;
use async_trait::async_trait;
use containers::{BlockHeader, Bytes32, HeaderEntry};

/// Peer connection state as seen by the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session attached.
    Disconnected,
    /// Session attached, requests may be issued.
    Connected,
}

/// Messages a peer session delivers to the coordinator's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Response to a locator request. Empty when the peer has nothing newer.
    Headers(Vec<BlockHeader>),
    /// Unsolicited notice of a new block at the peer's tip.
    Announced(Bytes32),
    /// The transport went away.
    Disconnected,
}

/// Outbound side of a peer session.
///
/// Wire framing, handshakes and retry/backoff live behind this trait.
/// Responses are not returned here; they arrive later as [`PeerEvent`]s on
/// the queue handed to the coordinator together with the session, one
/// [`PeerEvent::Headers`] per request and in request order.
#[async_trait]
pub trait PeerSession: Send + Sync {
    async fn request_headers(&self, locator: Vec<Bytes32>) -> Result<()>;

    async fn disconnect(&self);
}

/// Tip-change notification for wallets and indexers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipEvent {
    /// New headers were appended; carries the new tip.
    Connected(HeaderEntry),
    /// The index was truncated; carries the new tip.
    Reset(HeaderEntry),
    /// History below a checkpoint was dropped; carries the new root.
    Pruned(HeaderEntry),
}
