//! What the session shows to the user.

use crate::location::LocationFix;
use async_trait::async_trait;
use log::info;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Waiting,
    Connected,
    Disconnected,
}

/// The single status line every outcome and error is reported through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

impl Status {
    fn new(message: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn welcome() -> Self {
        Self::new("Enter your phone number to get started", StatusKind::Waiting)
    }

    pub fn ready(number: &str) -> Self {
        Self::new(format!("Ready! Your number: {number}"), StatusKind::Waiting)
    }

    pub fn calling(name: &str) -> Self {
        Self::new(format!("Calling {name}..."), StatusKind::Waiting)
    }

    pub fn connected(name: &str) -> Self {
        Self::new(format!("Connected to {name}"), StatusKind::Connected)
    }

    pub fn identifier_in_use() -> Self {
        Self::new("Phone number already in use!", StatusKind::Disconnected)
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self::new(format!("Error: {message}"), StatusKind::Disconnected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The push-to-talk indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioStatus {
    /// No open connection.
    Unavailable,
    Ready,
    Transmitting,
    PeerTransmitting(String),
}

impl fmt::Display for AudioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("Connect to a friend to enable PTT"),
            Self::Ready => f.write_str("PTT ready - hold button to talk"),
            Self::Transmitting => f.write_str("You are transmitting"),
            Self::PeerTransmitting(name) => write!(f, "{name} is transmitting..."),
        }
    }
}

/// Rendering surfaces driven by the session: status line, PTT control,
/// map, and the accept/reject prompt for unknown callers.
#[async_trait]
pub trait Presentation: Send + Sync {
    fn show_status(&self, status: &Status);

    fn set_audio_status(&self, status: &AudioStatus);

    fn set_ptt_enabled(&self, enabled: bool);

    /// Reveal the map and call controls for a connected peer.
    fn show_surfaces(&self, peer_name: &str);

    fn hide_surfaces(&self);

    fn refresh_map(&self, mine: Option<LocationFix>, peer: Option<LocationFix>);

    /// Ask whether to accept a connection from a number not in the contacts.
    async fn confirm_inbound(&self, display_number: &str) -> bool;
}

/// Writes everything to the log and answers prompts with a fixed choice.
#[derive(Debug, Clone)]
pub struct LogPresentation {
    accept_unknown: bool,
}

impl LogPresentation {
    pub fn new(accept_unknown: bool) -> Self {
        Self { accept_unknown }
    }
}

#[async_trait]
impl Presentation for LogPresentation {
    fn show_status(&self, status: &Status) {
        info!(target: "Presentation", "Status: {status}");
    }

    fn set_audio_status(&self, status: &AudioStatus) {
        info!(target: "Presentation", "Audio: {status}");
    }

    fn set_ptt_enabled(&self, enabled: bool) {
        info!(target: "Presentation", "PTT {}", if enabled { "enabled" } else { "disabled" });
    }

    fn show_surfaces(&self, peer_name: &str) {
        info!(target: "Presentation", "Showing map for {peer_name}");
    }

    fn hide_surfaces(&self) {
        info!(target: "Presentation", "Map closed");
    }

    fn refresh_map(&self, mine: Option<LocationFix>, peer: Option<LocationFix>) {
        info!(target: "Presentation", "Map markers: me={mine:?} friend={peer:?}");
    }

    async fn confirm_inbound(&self, display_number: &str) -> bool {
        info!(
            target: "Presentation",
            "Incoming call from {display_number}. {}",
            if self.accept_unknown { "Accepting" } else { "Declining" }
        );
        self.accept_unknown
    }
}
