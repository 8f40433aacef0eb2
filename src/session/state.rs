//! Connection state machine.
//!
//! The session holds at most one data channel. Its slot moves through
//! `Idle → Connecting → Open → Closed → Idle`; replacing a channel closes
//! the old one (`Closed { reason: Replaced }`) before dialing the new one.

use crate::identity::PeerId;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    LocalDisconnect,
    RemoteClosed,
    TransportError,
    Replaced,
}

/// Current state of the connection slot.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Idle,
    /// Outbound request issued, or inbound request accepted; waiting for the
    /// channel to open.
    Connecting {
        direction: Direction,
        started_at: DateTime<Utc>,
    },
    /// Channel usable for control messages.
    Open {
        direction: Direction,
        opened_at: DateTime<Utc>,
    },
    /// Torn down; the slot returns to idle right after cleanup.
    Closed {
        reason: CloseReason,
        closed_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },
}

impl ConnectionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// True while a connection occupies the slot.
    pub fn is_live(&self) -> bool {
        self.is_connecting() || self.is_open()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTransition {
    Dial,
    Accept,
    Opened,
    Close { reason: CloseReason },
    Reset,
}

impl ConnectionState {
    /// Apply a state transition. Returns error if transition is invalid.
    pub fn apply(&mut self, transition: ConnectionTransition) -> Result<(), InvalidTransition> {
        let next = match (&*self, transition) {
            (Self::Idle, ConnectionTransition::Dial) => Self::Connecting {
                direction: Direction::Outgoing,
                started_at: Utc::now(),
            },
            (Self::Idle, ConnectionTransition::Accept) => Self::Connecting {
                direction: Direction::Incoming,
                started_at: Utc::now(),
            },
            (Self::Connecting { direction, .. }, ConnectionTransition::Opened) => Self::Open {
                direction: *direction,
                opened_at: Utc::now(),
            },
            (Self::Connecting { .. }, ConnectionTransition::Close { reason }) => Self::Closed {
                reason,
                closed_at: Utc::now(),
                duration_secs: None,
            },
            (Self::Open { opened_at, .. }, ConnectionTransition::Close { reason }) => {
                let duration = Utc::now().signed_duration_since(*opened_at).num_seconds();
                Self::Closed {
                    reason,
                    closed_at: Utc::now(),
                    duration_secs: Some(duration),
                }
            }
            (Self::Closed { .. }, ConnectionTransition::Reset) => Self::Idle,
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{current:?}"),
                    attempted: format!("{transition:?}"),
                });
            }
        };
        *self = next;
        Ok(())
    }
}

/// Who the current connection is with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub remote_id: PeerId,
    pub remote_name: String,
    pub created_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(remote_id: PeerId, remote_name: impl Into<String>) -> Self {
        Self {
            remote_id,
            remote_name: remote_name.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}
