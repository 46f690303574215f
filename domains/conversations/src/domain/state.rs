//! State machine for conversation status transitions
//!
//! Lifecycle: `active` on creation; `active ↔ handed_off` via
//! handoff request/release; `active | handed_off → resolved`;
//! `active → expired` via the inactivity sweep. `resolved` and
//! `expired` are terminal.

pub use chatrelay_common::StateError;

use crate::domain::entities::ConversationStatus;

/// Events that trigger conversation status transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConversationEvent {
    /// Escalate to a human agent (keyword/confidence detection or an
    /// explicit operator request)
    RequestHandoff,
    /// Assign an agent, forcing the conversation into handed_off
    AssignAgent,
    /// Return a handed-off conversation to automated handling
    ReleaseHandoff,
    /// Close the conversation as resolved
    Resolve,
    /// Expire the conversation for inactivity
    Expire,
}

impl std::fmt::Display for ConversationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestHandoff => write!(f, "request_handoff"),
            Self::AssignAgent => write!(f, "assign_agent"),
            Self::ReleaseHandoff => write!(f, "release_handoff"),
            Self::Resolve => write!(f, "resolve"),
            Self::Expire => write!(f, "expire"),
        }
    }
}

/// Conversation status state machine
pub struct ConversationStateMachine;

impl ConversationStateMachine {
    /// Attempt a state transition
    ///
    /// Terminal states reject every event with `StateError::TerminalState`;
    /// callers that want no-op semantics (handoff release on a resolved
    /// conversation) check `is_terminal()` before raising the event.
    pub fn transition(
        current: ConversationStatus,
        event: ConversationEvent,
    ) -> Result<ConversationStatus, StateError> {
        use ConversationEvent as E;
        use ConversationStatus as S;

        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (current, event) {
            // Requesting again while handed off overwrites the reason
            (S::Active | S::HandedOff, E::RequestHandoff) => S::HandedOff,
            (S::Active | S::HandedOff, E::AssignAgent) => S::HandedOff,
            // Releasing an already-active conversation is a no-op
            (S::Active | S::HandedOff, E::ReleaseHandoff) => S::Active,
            (S::Active | S::HandedOff, E::Resolve) => S::Resolved,
            // Only the inactivity sweep expires, and only from active
            (S::Active, E::Expire) => S::Expired,
            (from, event) => {
                return Err(StateError::InvalidTransition {
                    from: from.to_string(),
                    to: "expired".to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    /// Map a requested target status to the event that reaches it.
    ///
    /// Used by the status-update endpoint, which speaks in target
    /// states rather than events.
    pub fn event_for_target(target: ConversationStatus) -> ConversationEvent {
        match target {
            ConversationStatus::Active => ConversationEvent::ReleaseHandoff,
            ConversationStatus::HandedOff => ConversationEvent::RequestHandoff,
            ConversationStatus::Resolved => ConversationEvent::Resolve,
            ConversationStatus::Expired => ConversationEvent::Expire,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationEvent as E;
    use ConversationStatus as S;

    #[test]
    fn test_active_to_handed_off() {
        assert_eq!(
            ConversationStateMachine::transition(S::Active, E::RequestHandoff),
            Ok(S::HandedOff)
        );
        assert_eq!(
            ConversationStateMachine::transition(S::Active, E::AssignAgent),
            Ok(S::HandedOff)
        );
    }

    #[test]
    fn test_handed_off_request_again_stays_handed_off() {
        assert_eq!(
            ConversationStateMachine::transition(S::HandedOff, E::RequestHandoff),
            Ok(S::HandedOff)
        );
    }

    #[test]
    fn test_handed_off_release_returns_to_active() {
        assert_eq!(
            ConversationStateMachine::transition(S::HandedOff, E::ReleaseHandoff),
            Ok(S::Active)
        );
    }

    #[test]
    fn test_resolve_from_active_and_handed_off() {
        assert_eq!(
            ConversationStateMachine::transition(S::Active, E::Resolve),
            Ok(S::Resolved)
        );
        assert_eq!(
            ConversationStateMachine::transition(S::HandedOff, E::Resolve),
            Ok(S::Resolved)
        );
    }

    #[test]
    fn test_expire_only_from_active() {
        assert_eq!(
            ConversationStateMachine::transition(S::Active, E::Expire),
            Ok(S::Expired)
        );
        assert!(matches!(
            ConversationStateMachine::transition(S::HandedOff, E::Expire),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_terminal_states_reject_all_events() {
        for terminal in [S::Resolved, S::Expired] {
            for event in [
                E::RequestHandoff,
                E::AssignAgent,
                E::ReleaseHandoff,
                E::Resolve,
                E::Expire,
            ] {
                assert!(matches!(
                    ConversationStateMachine::transition(terminal, event),
                    Err(StateError::TerminalState(_))
                ));
            }
        }
    }

    #[test]
    fn test_release_on_active_is_identity() {
        assert_eq!(
            ConversationStateMachine::transition(S::Active, E::ReleaseHandoff),
            Ok(S::Active)
        );
    }

    #[test]
    fn test_event_for_target_mapping() {
        assert_eq!(
            ConversationStateMachine::event_for_target(S::Resolved),
            E::Resolve
        );
        assert_eq!(
            ConversationStateMachine::event_for_target(S::HandedOff),
            E::RequestHandoff
        );
        assert_eq!(
            ConversationStateMachine::event_for_target(S::Active),
            E::ReleaseHandoff
        );
        assert_eq!(
            ConversationStateMachine::event_for_target(S::Expired),
            E::Expire
        );
    }
}
