//! Session-level error types.

use crate::media::MediaError;
use crate::registry::RegistryError;
use crate::signaling::TransportError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Another endpoint already holds this identifier. Terminal for the
    /// registration; the user has to pick a different number.
    #[error("phone number {0} is already in use")]
    IdentifierConflict(String),

    #[error("not registered: set a phone number first")]
    NotRegistered,

    #[error("invalid phone number: {0:?}")]
    InvalidPhoneNumber(String),

    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to release {resource}: {reason}")]
    ResourceRelease {
        resource: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid connection state transition: {0}")]
    InvalidTransition(#[from] super::state::InvalidTransition),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("session has shut down")]
    Closed,
}

impl From<MediaError> for SessionError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::PermissionDenied(m) => Self::PermissionDenied(m),
            MediaError::DeviceUnavailable(m) => Self::DeviceUnavailable(m),
            MediaError::Playback(m) => Self::DeviceUnavailable(m),
            MediaError::Release(reason) => Self::ResourceRelease {
                resource: "audio",
                reason,
            },
        }
    }
}

impl SessionError {
    pub(crate) fn release(resource: &'static str, reason: impl ToString) -> Self {
        Self::ResourceRelease {
            resource,
            reason: reason.to_string(),
        }
    }
}
