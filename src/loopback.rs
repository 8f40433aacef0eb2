//! In-process rendezvous for running several sessions against each other
//! without a network.
//!
//! Every endpoint opened through one [`LoopbackNetwork`] can reach every
//! other endpoint on it. Channels open immediately, payloads are delivered
//! in order, and calls swap the streams both sides handed in.

use crate::identity::PeerId;
use crate::media::MediaStream;
use crate::signaling::{
    CallEvent, CallHandle, CallLink, CallRequest, ConnectionEvent, ConnectionHandle,
    ConnectionLink, EndpointEvent, EventStream, IceConfig, SignalingEndpoint, SignalingFactory,
    TransportError,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

/// Both ends of a channel or call. Side 0 is the initiator.
struct Wire<E> {
    open: AtomicBool,
    sides: [mpsc::UnboundedSender<E>; 2],
}

impl<E> Wire<E> {
    fn new() -> (Arc<Self>, EventStream<E>, EventStream<E>) {
        let (initiator_tx, initiator_rx) = mpsc::unbounded_channel();
        let (acceptor_tx, acceptor_rx) = mpsc::unbounded_channel();
        let wire = Arc::new(Self {
            open: AtomicBool::new(true),
            sides: [initiator_tx, acceptor_tx],
        });
        (wire, initiator_rx, acceptor_rx)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn deliver(&self, side: usize, event: E) {
        let _ = self.sides[side].send(event);
    }

    /// Close both sides once. Returns false if already closed.
    fn shut(&self, closed: impl Fn() -> E) -> bool {
        if !self.open.swap(false, Ordering::SeqCst) {
            return false;
        }
        for side in &self.sides {
            let _ = side.send(closed());
        }
        true
    }
}

/// Remember `wire` for teardown, forgetting wires nobody holds anymore.
fn track<E>(wires: &mut Vec<Weak<Wire<E>>>, wire: &Arc<Wire<E>>) {
    wires.retain(|w| w.strong_count() > 0);
    wires.push(Arc::downgrade(wire));
}

struct Registration {
    instance: u64,
    events: mpsc::UnboundedSender<EndpointEvent>,
    connections: Vec<Weak<Wire<ConnectionEvent>>>,
    calls: Vec<Weak<Wire<CallEvent>>>,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<PeerId, Registration>,
}

/// The shared rendezvous.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
    next_instance: Arc<AtomicU64>,
}

fn lock(state: &Mutex<NetworkState>) -> MutexGuard<'_, NetworkState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is currently held by an endpoint.
    pub fn is_registered(&self, id: &PeerId) -> bool {
        lock(&self.state).endpoints.contains_key(id)
    }
}

#[async_trait]
impl SignalingFactory for LoopbackNetwork {
    async fn open(
        &self,
        id: &PeerId,
        _ice: &IceConfig,
    ) -> Result<(Arc<dyn SignalingEndpoint>, EventStream<EndpointEvent>), TransportError> {
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(LoopbackEndpoint {
            id: id.clone(),
            instance,
            network: Arc::downgrade(&self.state),
            destroyed: AtomicBool::new(false),
        });

        let mut state = lock(&self.state);
        if state.endpoints.contains_key(id) {
            warn!(target: "Loopback", "Identifier {id} is already taken");
            endpoint.destroyed.store(true, Ordering::SeqCst);
            let _ = tx.send(EndpointEvent::Error(TransportError::UnavailableId(id.clone())));
        } else {
            info!(target: "Loopback", "Endpoint {id} joined");
            let _ = tx.send(EndpointEvent::Ready(id.clone()));
            state.endpoints.insert(
                id.clone(),
                Registration {
                    instance,
                    events: tx,
                    connections: Vec::new(),
                    calls: Vec::new(),
                },
            );
        }
        Ok((endpoint, rx))
    }
}

pub struct LoopbackEndpoint {
    id: PeerId,
    instance: u64,
    network: Weak<Mutex<NetworkState>>,
    destroyed: AtomicBool,
}

impl LoopbackEndpoint {
    fn network(&self) -> Result<Arc<Mutex<NetworkState>>, TransportError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }
        self.network.upgrade().ok_or(TransportError::Destroyed)
    }
}

impl SignalingEndpoint for LoopbackEndpoint {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn connect(&self, remote: &PeerId) -> Result<ConnectionLink, TransportError> {
        let network = self.network()?;
        let (wire, local_rx, remote_rx) = Wire::new();
        let local = ConnectionLink {
            handle: Arc::new(LoopbackConnection {
                remote_id: remote.clone(),
                wire: wire.clone(),
                side: 0,
            }),
            events: local_rx,
        };

        let mut state = lock(&network);
        let Some(target) = state.endpoints.get_mut(remote) else {
            debug!(target: "Loopback", "{} dialed absent peer {remote}", self.id);
            wire.open.store(false, Ordering::SeqCst);
            wire.deliver(0, ConnectionEvent::Error(TransportError::PeerUnavailable(remote.clone())));
            return Ok(local);
        };
        track(&mut target.connections, &wire);
        let inbound = ConnectionLink {
            handle: Arc::new(LoopbackConnection {
                remote_id: self.id.clone(),
                wire: wire.clone(),
                side: 1,
            }),
            events: remote_rx,
        };
        let _ = target.events.send(EndpointEvent::IncomingConnection(inbound));
        if let Some(me) = state.endpoints.get_mut(&self.id) {
            track(&mut me.connections, &wire);
        }
        wire.deliver(0, ConnectionEvent::Opened);
        wire.deliver(1, ConnectionEvent::Opened);
        Ok(local)
    }

    fn call(&self, remote: &PeerId, stream: &MediaStream) -> Result<CallLink, TransportError> {
        let network = self.network()?;
        let mut state = lock(&network);
        let target = state
            .endpoints
            .get_mut(remote)
            .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;

        let (wire, local_rx, remote_rx) = Wire::new();
        track(&mut target.calls, &wire);
        let request = LoopbackCallRequest {
            remote_id: self.id.clone(),
            offered: stream.clone(),
            wire: wire.clone(),
            events: remote_rx,
        };
        let _ = target
            .events
            .send(EndpointEvent::IncomingCall(Box::new(request)));
        if let Some(me) = state.endpoints.get_mut(&self.id) {
            track(&mut me.calls, &wire);
        }
        debug!(target: "Loopback", "{} calling {remote} with {}", self.id, stream.id());
        Ok(CallLink {
            handle: Arc::new(LoopbackCall {
                remote_id: remote.clone(),
                wire,
            }),
            events: local_rx,
        })
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(network) = self.network.upgrade() else {
            return;
        };
        let registration = {
            let mut state = lock(&network);
            match state.endpoints.get(&self.id) {
                Some(r) if r.instance == self.instance => state.endpoints.remove(&self.id),
                _ => None,
            }
        };
        let Some(registration) = registration else {
            return;
        };
        info!(target: "Loopback", "Endpoint {} left", self.id);
        for wire in registration.connections.iter().filter_map(Weak::upgrade) {
            wire.shut(|| ConnectionEvent::Closed);
        }
        for wire in registration.calls.iter().filter_map(Weak::upgrade) {
            wire.shut(|| CallEvent::Closed);
        }
    }
}

struct LoopbackConnection {
    remote_id: PeerId,
    wire: Arc<Wire<ConnectionEvent>>,
    side: usize,
}

impl ConnectionHandle for LoopbackConnection {
    fn remote_id(&self) -> &PeerId {
        &self.remote_id
    }

    fn send(&self, payload: &str) -> Result<(), TransportError> {
        if !self.wire.is_open() {
            return Err(TransportError::ChannelClosed);
        }
        self.wire
            .deliver(1 - self.side, ConnectionEvent::Data(payload.to_string()));
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.wire.shut(|| ConnectionEvent::Closed);
        Ok(())
    }
}

struct LoopbackCall {
    remote_id: PeerId,
    wire: Arc<Wire<CallEvent>>,
}

impl CallHandle for LoopbackCall {
    fn remote_id(&self) -> &PeerId {
        &self.remote_id
    }

    fn close(&self) -> Result<(), TransportError> {
        self.wire.shut(|| CallEvent::Closed);
        Ok(())
    }
}

struct LoopbackCallRequest {
    remote_id: PeerId,
    offered: MediaStream,
    wire: Arc<Wire<CallEvent>>,
    events: EventStream<CallEvent>,
}

impl CallRequest for LoopbackCallRequest {
    fn remote_id(&self) -> &PeerId {
        &self.remote_id
    }

    fn answer(self: Box<Self>, stream: &MediaStream) -> Result<CallLink, TransportError> {
        if !self.wire.is_open() {
            return Err(TransportError::ChannelClosed);
        }
        self.wire.deliver(0, CallEvent::RemoteStream(stream.clone()));
        self.wire.deliver(1, CallEvent::RemoteStream(self.offered));
        Ok(CallLink {
            handle: Arc::new(LoopbackCall {
                remote_id: self.remote_id,
                wire: self.wire,
            }),
            events: self.events,
        })
    }

    fn reject(self: Box<Self>) {
        self.wire.shut(|| CallEvent::Closed);
    }
}
