use rstest::rstest;

use crate::sync::SyncState;

#[rstest]
#[case(SyncState::Closed, SyncState::Opening)]
#[case(SyncState::Opening, SyncState::Connecting)]
#[case(SyncState::Connecting, SyncState::Syncing)]
#[case(SyncState::Syncing, SyncState::Idle)]
#[case(SyncState::Idle, SyncState::Syncing)]
#[case(SyncState::Syncing, SyncState::Closed)]
#[case(SyncState::Idle, SyncState::Closed)]
#[case(SyncState::Syncing, SyncState::Opening)]
fn test_allowed_transitions(#[case] from: SyncState, #[case] to: SyncState) {
    assert!(from.can_transition_to(to));
}

#[rstest]
#[case(SyncState::Closed, SyncState::Syncing)]
#[case(SyncState::Closed, SyncState::Idle)]
#[case(SyncState::Opening, SyncState::Syncing)]
#[case(SyncState::Connecting, SyncState::Idle)]
#[case(SyncState::Idle, SyncState::Connecting)]
fn test_rejected_transitions(#[case] from: SyncState, #[case] to: SyncState) {
    assert!(!from.can_transition_to(to));
}

#[test]
fn test_default_state_is_closed() {
    assert_eq!(SyncState::default(), SyncState::Closed);
    assert!(!SyncState::Opening.has_session());
    assert!(SyncState::Idle.has_session());
}
