//! Session state machine. The allowed-transition matrix is the single
//! source of truth; every state change is checked against it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Ready,
    Listening,
    Thinking,
    Speaking,
    Interrupted,
    Error,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Ready => "ready",
            SessionState::Listening => "listening",
            SessionState::Thinking => "thinking",
            SessionState::Speaking => "speaking",
            SessionState::Interrupted => "interrupted",
            SessionState::Error => "error",
            SessionState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Whether `to` is a legal transition from `self`, per the happy path
    /// `ready -> listening -> thinking -> speaking -> ready`, with
    /// `interrupted` reachable from `speaking`/`thinking`, `error` reachable
    /// from any non-terminal state, and `stopped` terminal and reachable
    /// from anywhere (including itself, so `stop()` is idempotent).
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        use SessionState::*;
        if *self == Stopped {
            return to == Stopped;
        }
        if to == Stopped || to == Error {
            return true;
        }
        matches!(
            (self, to),
            (Ready, Listening)
                | (Listening, Thinking)
                | (Listening, Ready)
                | (Thinking, Speaking)
                | (Thinking, Ready)
                | (Thinking, Interrupted)
                | (Speaking, Ready)
                | (Speaking, Interrupted)
                | (Interrupted, Ready)
                | (Interrupted, Listening)
                | (Error, Ready)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SessionState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "listening" => SessionState::Listening,
            "thinking" => SessionState::Thinking,
            "speaking" => SessionState::Speaking,
            "interrupted" => SessionState::Interrupted,
            "error" => SessionState::Error,
            "stopped" => SessionState::Stopped,
            _ => SessionState::Ready,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn happy_path_is_allowed() {
        assert!(Ready.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Thinking));
        assert!(Thinking.can_transition_to(Speaking));
        assert!(Speaking.can_transition_to(Ready));
    }

    #[test]
    fn interrupted_reachable_from_speaking_and_thinking_only() {
        assert!(Speaking.can_transition_to(Interrupted));
        assert!(Thinking.can_transition_to(Interrupted));
        assert!(!Ready.can_transition_to(Interrupted));
        assert!(!Listening.can_transition_to(Interrupted));
    }

    #[test]
    fn error_reachable_from_any_non_terminal_state() {
        for state in [Ready, Listening, Thinking, Speaking, Interrupted, Error] {
            assert!(state.can_transition_to(Error), "{state:?} -> Error should be allowed");
        }
    }

    #[test]
    fn stopped_is_terminal_and_self_transition_is_idempotent() {
        assert!(Stopped.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Ready));
        for state in [Ready, Listening, Thinking, Speaking, Interrupted, Error] {
            assert!(state.can_transition_to(Stopped));
        }
    }

    #[test]
    fn thinking_cannot_jump_straight_to_listening() {
        assert!(!Thinking.can_transition_to(Listening));
    }

    #[test]
    fn serializes_as_lowercase_string() {
        assert_eq!(serde_json::to_string(&Thinking).unwrap(), "\"thinking\"");
    }
}
