/// Sync coordinator state machine.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Nothing open. Initial state, and the state after an explicit close.
    #[default]
    Closed,

    /// Chain index initialized and the persisted tip loaded.
    ///
    /// Also the state the coordinator falls back to after a peer session
    /// misbehaves or goes away, so that a fresh session can be attached.
    Opening,

    /// A peer session is attached but no header request has been issued.
    Connecting,

    /// Header requests are in flight and batches are being applied.
    Syncing,

    /// The peer reported no further headers. Waiting for announcements.
    Idle,
}

impl SyncState {
    /// Check if a transition to the target state is valid.
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        match self {
            SyncState::Closed => matches!(target, SyncState::Opening),
            SyncState::Opening => matches!(target, SyncState::Connecting | SyncState::Closed),
            SyncState::Connecting => matches!(
                target,
                SyncState::Syncing | SyncState::Opening | SyncState::Closed
            ),
            SyncState::Syncing => matches!(
                target,
                SyncState::Idle | SyncState::Opening | SyncState::Closed
            ),
            SyncState::Idle => matches!(
                target,
                SyncState::Syncing | SyncState::Opening | SyncState::Closed
            ),
        }
    }

    /// Whether a peer session is attached in this state.
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            SyncState::Connecting | SyncState::Syncing | SyncState::Idle
        )
    }

    /// Numeric encoding exported as a gauge.
    pub fn code(&self) -> i64 {
        match self {
            SyncState::Closed => 0,
            SyncState::Opening => 1,
            SyncState::Connecting => 2,
            SyncState::Syncing => 3,
            SyncState::Idle => 4,
        }
    }
}
