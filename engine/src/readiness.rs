//! Handshake/readiness tracking for one engine connection.
//!
//! ```text
//! Uninitialized -> AwaitingHandshake -> Ready
//!        \________________\_____________\____-> Terminated
//! ```
//!
//! Transitions that are not on this graph are absorbed: the method returns
//! `false` and the state is left alone.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    #[default]
    Uninitialized,
    AwaitingHandshake,
    Ready,
    Terminated,
}

#[derive(Debug, Default)]
pub struct Readiness {
    state: ReadinessState,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ReadinessState::Terminated
    }

    /// Handshake commands have been sent.
    pub fn begin_handshake(&mut self) -> bool {
        self.transition(ReadinessState::Uninitialized, ReadinessState::AwaitingHandshake)
    }

    /// `readyok` was observed. Returns `true` only for the transition itself.
    pub fn mark_ready(&mut self) -> bool {
        self.transition(ReadinessState::AwaitingHandshake, ReadinessState::Ready)
    }

    /// Terminal. Returns `false` when already terminated.
    pub fn terminate(&mut self) -> bool {
        if self.is_terminated() {
            return false;
        }
        tracing::debug!("Readiness {:?} -> Terminated", self.state);
        self.state = ReadinessState::Terminated;
        true
    }

    fn transition(&mut self, from: ReadinessState, to: ReadinessState) -> bool {
        if self.state != from {
            tracing::trace!("Ignoring readiness transition {:?} -> {:?} from {:?}", from, to, self.state);
            return false;
        }
        tracing::debug!("Readiness {:?} -> {:?}", from, to);
        self.state = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut readiness = Readiness::new();
        assert_eq!(readiness.state(), ReadinessState::Uninitialized);
        assert!(readiness.begin_handshake());
        assert_eq!(readiness.state(), ReadinessState::AwaitingHandshake);
        assert!(!readiness.is_ready());
        assert!(readiness.mark_ready());
        assert!(readiness.is_ready());
    }

    #[test]
    fn test_ready_only_once() {
        let mut readiness = Readiness::new();
        readiness.begin_handshake();
        assert!(readiness.mark_ready());
        assert!(!readiness.mark_ready());
        assert!(readiness.is_ready());
    }

    #[test]
    fn test_ready_requires_handshake() {
        let mut readiness = Readiness::new();
        assert!(!readiness.mark_ready());
        assert_eq!(readiness.state(), ReadinessState::Uninitialized);
    }

    #[test]
    fn test_terminate_from_every_state() {
        for steps in 0..3 {
            let mut readiness = Readiness::new();
            if steps > 0 {
                readiness.begin_handshake();
            }
            if steps > 1 {
                readiness.mark_ready();
            }
            assert!(readiness.terminate());
            assert!(readiness.is_terminated());
        }
    }

    #[test]
    fn test_terminated_is_final() {
        let mut readiness = Readiness::new();
        readiness.begin_handshake();
        assert!(readiness.terminate());
        assert!(!readiness.terminate());
        assert!(!readiness.mark_ready());
        assert!(!readiness.begin_handshake());
        assert_eq!(readiness.state(), ReadinessState::Terminated);
    }
}
