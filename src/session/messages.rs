use super::error::SessionError;
use super::ptt::{RemoteIndicator, TransmissionState};
use super::state::ConnectionState;
use crate::identity::PeerId;
use crate::location::LocationFix;
use crate::media::{MediaError, Microphone};
use crate::registry::Contact;
use crate::signaling::{CallEvent, ConnectionEvent, EndpointEvent};
use serde::Serialize;
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

// --- Commands from the public handle ---
pub(crate) enum SessionCommand {
    Register {
        phone: String,
        reply: Reply<PeerId>,
    },
    AddContact {
        name: String,
        phone: String,
        reply: Reply<Contact>,
    },
    DeleteContact {
        id: PeerId,
        reply: Reply<Contact>,
    },
    ConnectTo {
        id: PeerId,
        name: String,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    StartTransmission {
        reply: Reply<()>,
    },
    StopTransmission {
        reply: Reply<()>,
    },
    RequestLocation {
        reply: Reply<LocationFix>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// --- Events fed back into the actor ---
//
// Everything that completes outside the actor (collaborator events,
// microphone/location acquisition, timers) comes back through here and is
// checked against the current generation before it is acted on.
pub(crate) enum SessionEvent {
    Endpoint {
        generation: u64,
        event: EndpointEvent,
    },
    EndpointGone {
        generation: u64,
    },
    Connection {
        generation: u64,
        event: ConnectionEvent,
    },
    Call {
        generation: u64,
        event: CallEvent,
    },
    InboundDecision {
        ticket: u64,
        accepted: bool,
    },
    MicrophoneReady {
        epoch: u64,
        result: Result<Microphone, MediaError>,
    },
    LocationResolved(LocationFix),
    TransmissionDeadline {
        transmission: u64,
    },
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub local_id: Option<PeerId>,
    pub local_number: Option<String>,
    /// The rendezvous accepted our identifier.
    pub registered: bool,
    pub identifier_conflict: bool,
    pub connection: ConnectionState,
    pub peer_id: Option<PeerId>,
    pub peer_name: Option<String>,
    pub has_call: bool,
    pub transmission: TransmissionState,
    pub remote: RemoteIndicator,
    pub microphone_held: bool,
    pub my_location: Option<LocationFix>,
    pub peer_location: Option<LocationFix>,
    pub contacts: Vec<Contact>,
    pub pending_inbound: usize,
}
