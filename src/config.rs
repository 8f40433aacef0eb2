use crate::location::{DEFAULT_FIX, LocationFix, LocationOptions};
use crate::media::AudioConstraints;
use crate::signaling::IceConfig;
use std::time::Duration;

/// Hard ceiling on a single push-to-talk transmission.
pub const MAX_TRANSMISSION: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// STUN/TURN server URLs passed to the signaling endpoint.
    pub ice_servers: Vec<String>,
    pub max_transmission: Duration,
    pub location: LocationOptions,
    /// Reported as our position when no reading can be obtained.
    pub default_location: LocationFix,
    pub microphone: AudioConstraints,
    /// Capacity of the command channel feeding the session actor.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            max_transmission: MAX_TRANSMISSION,
            location: LocationOptions::default(),
            default_location: DEFAULT_FIX,
            microphone: AudioConstraints::default(),
            command_buffer: 32,
        }
    }
}

impl SessionConfig {
    pub fn ice(&self) -> IceConfig {
        IceConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}
