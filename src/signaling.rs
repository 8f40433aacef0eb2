//! Peer-to-peer signaling boundary.
//!
//! A [`SignalingFactory`] opens a named rendezvous point and returns the
//! endpoint together with its event stream, the same shape a transport
//! factory uses for a socket. Data channels and audio calls opened through
//! the endpoint each come with their own event stream.

use crate::identity::PeerId;
use crate::media::MediaStream;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub type EventStream<T> = mpsc::UnboundedReceiver<T>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("identifier {0} is already in use")]
    UnavailableId(PeerId),

    #[error("peer {0} is unavailable")]
    PeerUnavailable(PeerId),

    #[error("channel is closed")]
    ChannelClosed,

    #[error("endpoint has been destroyed")]
    Destroyed,

    #[error("{kind}: {message}")]
    Other { kind: String, message: String },
}

/// NAT traversal configuration handed to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceConfig {
    pub ice_servers: Vec<String>,
}

/// Events emitted by an open endpoint.
pub enum EndpointEvent {
    /// The rendezvous accepted our identifier.
    Ready(PeerId),
    /// A remote endpoint opened a data channel to us.
    IncomingConnection(ConnectionLink),
    /// A remote endpoint is calling us.
    IncomingCall(Box<dyn CallRequest>),
    Error(TransportError),
}

impl fmt::Debug for EndpointEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(id) => f.debug_tuple("Ready").field(id).finish(),
            Self::IncomingConnection(link) => f
                .debug_tuple("IncomingConnection")
                .field(link.handle.remote_id())
                .finish(),
            Self::IncomingCall(request) => f
                .debug_tuple("IncomingCall")
                .field(request.remote_id())
                .finish(),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Data(String),
    Closed,
    Error(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    RemoteStream(MediaStream),
    Closed,
    Error(TransportError),
}

/// A data channel and the stream of its events.
pub struct ConnectionLink {
    pub handle: Arc<dyn ConnectionHandle>,
    pub events: EventStream<ConnectionEvent>,
}

/// An audio call and the stream of its events.
pub struct CallLink {
    pub handle: Arc<dyn CallHandle>,
    pub events: EventStream<CallEvent>,
}

#[async_trait]
pub trait SignalingFactory: Send + Sync {
    /// Open the rendezvous point under `id`.
    ///
    /// A clash with an identifier already held elsewhere may be reported
    /// either here or later as [`EndpointEvent::Error`] with
    /// [`TransportError::UnavailableId`].
    async fn open(
        &self,
        id: &PeerId,
        ice: &IceConfig,
    ) -> Result<(Arc<dyn SignalingEndpoint>, EventStream<EndpointEvent>), TransportError>;
}

pub trait SignalingEndpoint: Send + Sync {
    fn id(&self) -> &PeerId;

    /// Open a data channel to `remote`. The channel reports
    /// [`ConnectionEvent::Opened`] once usable.
    fn connect(&self, remote: &PeerId) -> Result<ConnectionLink, TransportError>;

    /// Call `remote`, sending `stream`.
    fn call(&self, remote: &PeerId, stream: &MediaStream) -> Result<CallLink, TransportError>;

    /// Leave the rendezvous. Safe to call more than once.
    fn destroy(&self);
}

pub trait ConnectionHandle: Send + Sync {
    fn remote_id(&self) -> &PeerId;

    fn send(&self, payload: &str) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;
}

pub trait CallHandle: Send + Sync {
    fn remote_id(&self) -> &PeerId;

    fn close(&self) -> Result<(), TransportError>;
}

/// An inbound call waiting to be answered.
pub trait CallRequest: Send + Sync {
    fn remote_id(&self) -> &PeerId;

    fn answer(self: Box<Self>, stream: &MediaStream) -> Result<CallLink, TransportError>;

    fn reject(self: Box<Self>);
}
