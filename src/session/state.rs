//! Observer session state machine
//!
//! Tracks one observer from attach to detach:
//!
//! ```text
//! Attaching ──► CatchingUp ──► Live ──► Detached
//!     │             │                      ▲
//!     └─────────────┴──────────────────────┘
//! ```
//!
//! `Detached` is terminal and can be entered from any phase. Nothing goes
//! back to `CatchingUp`.

use std::net::SocketAddr;
use std::time::Instant;

use crate::hub::{DetachReason, RoutingKey};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    /// Upgraded, not yet registered with the hub
    Attaching,
    /// Registered, replaying the history snapshot
    CatchingUp,
    /// Streaming live lines
    Live,
    /// Unregistered; terminal
    Detached,
}

/// Why an observer session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachCause {
    /// Observer sent a close frame or the connection ended
    PeerClosed,
    /// Reading from the observer failed
    ReadFailed,
    /// Writing to the observer failed or timed out
    WriteFailed,
    /// Nothing read from the observer within the liveness deadline
    LivenessTimeout,
    /// Observer sent something it must not (oversized message)
    ProtocolViolation,
    /// Hub dropped the subscriber because its queue overflowed
    Evicted,
    /// Hub was shut down
    HubShutdown,
    /// Subscriber was removed from the hub by someone else
    Unregistered,
}

impl DetachCause {
    /// Map the hub's reason for closing a queue to a session cause
    pub fn from_hub(reason: Option<DetachReason>) -> Self {
        match reason {
            Some(DetachReason::Overflow) => DetachCause::Evicted,
            Some(DetachReason::Shutdown) => DetachCause::HubShutdown,
            Some(DetachReason::Unregistered) | Some(DetachReason::Closed) | None => {
                DetachCause::Unregistered
            }
        }
    }
}

impl std::fmt::Display for DetachCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DetachCause::PeerClosed => "peer closed",
            DetachCause::ReadFailed => "read failed",
            DetachCause::WriteFailed => "write failed",
            DetachCause::LivenessTimeout => "liveness timeout",
            DetachCause::ProtocolViolation => "protocol violation",
            DetachCause::Evicted => "evicted (too slow)",
            DetachCause::HubShutdown => "hub shutdown",
            DetachCause::Unregistered => "unregistered",
        };
        f.write_str(s)
    }
}

/// Complete observer session state
#[derive(Debug)]
pub struct ObserverState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Key the observer follows
    pub key: RoutingKey,

    /// Current phase
    pub phase: ObserverPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Lines replayed from history
    pub catchup_lines: usize,

    /// Live lines written
    pub lines_sent: u64,

    /// Payload bytes written
    pub bytes_sent: u64,

    /// Why the session ended
    pub cause: Option<DetachCause>,
}

impl ObserverState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr, key: RoutingKey) -> Self {
        Self {
            id,
            peer_addr,
            key,
            phase: ObserverPhase::Attaching,
            connected_at: Instant::now(),
            catchup_lines: 0,
            lines_sent: 0,
            bytes_sent: 0,
            cause: None,
        }
    }

    /// Registered with the hub; start replaying history
    pub fn start_catchup(&mut self, lines: usize) {
        if self.phase == ObserverPhase::Attaching {
            self.phase = ObserverPhase::CatchingUp;
            self.catchup_lines = lines;
        }
    }

    /// History replayed; start streaming
    pub fn go_live(&mut self) {
        if self.phase == ObserverPhase::CatchingUp {
            self.phase = ObserverPhase::Live;
        }
    }

    /// Record a frame written to the observer
    pub fn on_sent(&mut self, bytes: usize) {
        if self.phase == ObserverPhase::Live {
            self.lines_sent += 1;
        }
        self.bytes_sent += bytes as u64;
    }

    /// Enter the terminal phase
    ///
    /// Returns false if the session was already detached; the first cause is
    /// kept.
    pub fn detach(&mut self, cause: DetachCause) -> bool {
        if self.phase == ObserverPhase::Detached {
            return false;
        }
        self.phase = ObserverPhase::Detached;
        self.cause = Some(cause);
        true
    }

    /// Check if the session is streaming
    pub fn is_live(&self) -> bool {
        self.phase == ObserverPhase::Live
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn state() -> ObserverState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000);
        ObserverState::new(1, addr, RoutingKey::new("h1"))
    }

    #[test]
    fn test_observer_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, ObserverPhase::Attaching);

        state.start_catchup(3);
        assert_eq!(state.phase, ObserverPhase::CatchingUp);
        assert_eq!(state.catchup_lines, 3);

        state.on_sent(5);
        assert_eq!(state.lines_sent, 0);

        state.go_live();
        assert!(state.is_live());

        state.on_sent(1);
        assert_eq!(state.lines_sent, 1);
        assert_eq!(state.bytes_sent, 6);

        assert!(state.detach(DetachCause::PeerClosed));
        assert_eq!(state.phase, ObserverPhase::Detached);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut state = state();
        state.start_catchup(0);

        assert!(state.detach(DetachCause::WriteFailed));
        assert!(!state.detach(DetachCause::PeerClosed));
        assert_eq!(state.cause, Some(DetachCause::WriteFailed));
    }

    #[test]
    fn test_detached_never_reenters_catchup() {
        let mut state = state();
        state.detach(DetachCause::HubShutdown);

        state.start_catchup(2);
        state.go_live();
        assert_eq!(state.phase, ObserverPhase::Detached);
        assert_eq!(state.catchup_lines, 0);
    }

    #[test]
    fn test_live_never_reenters_catchup() {
        let mut state = state();
        state.start_catchup(0);
        state.go_live();

        state.start_catchup(4);
        assert_eq!(state.phase, ObserverPhase::Live);
    }

    #[test]
    fn test_cause_from_hub() {
        assert_eq!(
            DetachCause::from_hub(Some(DetachReason::Overflow)),
            DetachCause::Evicted
        );
        assert_eq!(
            DetachCause::from_hub(Some(DetachReason::Shutdown)),
            DetachCause::HubShutdown
        );
        assert_eq!(DetachCause::from_hub(None), DetachCause::Unregistered);
    }
}
