//! The session actor.
//!
//! One task owns the registry, the signaling endpoint, the single
//! connection slot, the single call slot and the push-to-talk state.
//! Commands arrive from [`SessionHandle`](super::SessionHandle); everything
//! that finishes elsewhere (transport events, microphone and location
//! requests, timers, prompts) is fed back as a [`SessionEvent`] tagged with
//! the generation it belongs to, so late arrivals from replaced resources
//! are dropped instead of acting on the current ones.

use super::error::SessionError;
use super::messages::{Reply, SessionCommand, SessionEvent, SessionSnapshot};
use super::protocol::ControlMessage;
use super::ptt::PttController;
use super::state::{
    CloseReason, ConnectionInfo, ConnectionState, ConnectionTransition, Direction,
};
use crate::config::SessionConfig;
use crate::identity::PeerId;
use crate::location::{LocationExchange, LocationFix, LocationProvider, resolve_fix};
use crate::media::{AudioOutput, MediaCapture};
use crate::presentation::{AudioStatus, Presentation, Status};
use crate::registry::{Contact, SessionRegistry};
use crate::signaling::{
    CallHandle, ConnectionEvent, ConnectionHandle, ConnectionLink, EndpointEvent, EventStream,
    SignalingEndpoint, SignalingFactory, TransportError,
};
use crate::store::RegistryStore;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// External collaborators the actor drives.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub store: Arc<dyn RegistryStore>,
    pub signaling: Arc<dyn SignalingFactory>,
    pub capture: Arc<dyn MediaCapture>,
    pub output: Arc<dyn AudioOutput>,
    pub location: Arc<dyn LocationProvider>,
    pub presentation: Arc<dyn Presentation>,
}

pub(crate) struct ActiveConnection {
    pub generation: u64,
    pub handle: Arc<dyn ConnectionHandle>,
    pub info: ConnectionInfo,
    pub direction: Direction,
}

pub(crate) struct ActiveCall {
    pub generation: u64,
    pub handle: Arc<dyn CallHandle>,
    pub remote: PeerId,
    pub direction: Direction,
}

pub(crate) struct SessionActor {
    pub(super) config: SessionConfig,
    pub(super) deps: Collaborators,
    pub(super) registry: SessionRegistry,
    pub(super) events: mpsc::UnboundedSender<SessionEvent>,

    endpoint: Option<Arc<dyn SignalingEndpoint>>,
    endpoint_generation: u64,
    ready: bool,
    identifier_conflict: bool,
    pending_register: Option<Reply<PeerId>>,

    pub(super) state: ConnectionState,
    pub(super) connection: Option<ActiveConnection>,
    pub(super) call: Option<ActiveCall>,
    pending_inbound: HashMap<u64, ConnectionLink>,

    pub(super) ptt: PttController,
    location: LocationExchange,
    location_waiters: Vec<Reply<LocationFix>>,

    next_generation: u64,
}

/// Pump a collaborator event stream into the actor, wrapping each item.
/// `end` is delivered once when the stream finishes.
pub(super) fn forward<E: Send + 'static>(
    mut stream: EventStream<E>,
    events: mpsc::UnboundedSender<SessionEvent>,
    wrap: impl Fn(E) -> SessionEvent + Send + 'static,
    end: SessionEvent,
) {
    tokio::spawn(async move {
        while let Some(item) = stream.recv().await {
            if events.send(wrap(item)).is_err() {
                return;
            }
        }
        let _ = events.send(end);
    });
}

impl SessionActor {
    pub(crate) fn new(
        config: SessionConfig,
        deps: Collaborators,
        registry: SessionRegistry,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            deps,
            registry,
            events,
            endpoint: None,
            endpoint_generation: 0,
            ready: false,
            identifier_conflict: false,
            pending_register: None,
            state: ConnectionState::Idle,
            connection: None,
            call: None,
            pending_inbound: HashMap::new(),
            ptt: PttController::new(),
            location: LocationExchange::new(),
            location_waiters: Vec::new(),
            next_generation: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        info!(target: "Session", "Session started");
        self.restore().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!(target: "Session", "All handles dropped");
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }
        info!(target: "Session", "Session stopped");
    }

    pub(super) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Register the saved number, if there is one.
    async fn restore(&mut self) {
        match self.registry.local_source().map(str::to_string) {
            Some(phone) => {
                info!(target: "Session", "Restoring saved number {phone}");
                self.register(&phone, None).await;
            }
            None => self.deps.presentation.show_status(&Status::welcome()),
        }
    }

    /// Returns false once the actor should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Register { phone, reply } => self.register(&phone, Some(reply)).await,
            SessionCommand::AddContact { name, phone, reply } => {
                let _ = reply.send(self.add_contact(&name, &phone).await);
            }
            SessionCommand::DeleteContact { id, reply } => {
                let _ = reply.send(self.delete_contact(&id).await);
            }
            SessionCommand::ConnectTo { id, name, reply } => {
                let _ = reply.send(self.connect_to(id, name));
            }
            SessionCommand::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::StartTransmission { reply } => self.start_transmission(reply).await,
            SessionCommand::StopTransmission { reply } => {
                self.stop_transmission();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::RequestLocation { reply } => self.request_location(reply),
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Endpoint { generation, event } => {
                self.on_endpoint_event(generation, event)
            }
            SessionEvent::EndpointGone { generation } => {
                if self.endpoint.is_some() && generation == self.endpoint_generation {
                    warn!(target: "Session", "Signaling endpoint went away");
                    self.endpoint = None;
                    self.ready = false;
                }
            }
            SessionEvent::Connection { generation, event } => {
                self.on_connection_event(generation, event)
            }
            SessionEvent::Call { generation, event } => self.on_call_event(generation, event),
            SessionEvent::InboundDecision { ticket, accepted } => {
                self.on_inbound_decision(ticket, accepted)
            }
            SessionEvent::MicrophoneReady { epoch, result } => {
                self.on_microphone_ready(epoch, result).await
            }
            SessionEvent::LocationResolved(fix) => self.on_location_resolved(fix),
            SessionEvent::TransmissionDeadline { transmission } => {
                self.on_transmission_deadline(transmission)
            }
        }
    }

    // --- Registration ---

    async fn register(&mut self, phone: &str, reply: Option<Reply<PeerId>>) {
        if let Some(previous) = self.pending_register.take() {
            let _ = previous.send(Err(SessionError::Transport(TransportError::Destroyed)));
        }
        match self.open_endpoint(phone).await {
            Ok(()) => self.pending_register = reply,
            Err(e) => {
                error!(target: "Session", "Registration failed: {e}");
                if !matches!(e, SessionError::IdentifierConflict(_)) {
                    self.deps.presentation.show_status(&Status::error(&e));
                }
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    async fn open_endpoint(&mut self, phone: &str) -> Result<(), SessionError> {
        let id = self
            .registry
            .set_local_number(phone)
            .map_err(|_| SessionError::InvalidPhoneNumber(phone.trim().to_string()))?;
        if let Err(e) = self.deps.store.save_phone(phone.trim()).await {
            warn!(target: "Session", "Failed to persist phone number: {e}");
        }

        if self.endpoint.is_some() {
            self.disconnect();
            self.close_endpoint();
        }
        self.identifier_conflict = false;

        let ice = self.config.ice();
        let opened = self.deps.signaling.open(&id, &ice).await;
        let (endpoint, stream) = match opened {
            Ok(opened) => opened,
            Err(TransportError::UnavailableId(_)) => return Err(self.identifier_taken()),
            Err(e) => return Err(e.into()),
        };
        let generation = self.next_generation();
        info!(target: "Session", "Opening signaling endpoint as {id}");
        self.endpoint = Some(endpoint);
        self.endpoint_generation = generation;
        self.ready = false;
        forward(
            stream,
            self.events.clone(),
            move |event| SessionEvent::Endpoint { generation, event },
            SessionEvent::EndpointGone { generation },
        );
        Ok(())
    }

    fn identifier_taken(&mut self) -> SessionError {
        self.identifier_conflict = true;
        self.ready = false;
        self.deps.presentation.show_status(&Status::identifier_in_use());
        SessionError::IdentifierConflict(self.registry.local_number().unwrap_or_default())
    }

    fn close_endpoint(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            debug!(target: "Session", "Destroying endpoint {}", endpoint.id());
            endpoint.destroy();
        }
        self.ready = false;
    }

    fn on_endpoint_event(&mut self, generation: u64, event: EndpointEvent) {
        if self.endpoint.is_none() || generation != self.endpoint_generation {
            debug!(target: "Session", "Ignoring {event:?} from a replaced endpoint");
            match event {
                EndpointEvent::IncomingConnection(link) => {
                    let _ = link.handle.close();
                }
                EndpointEvent::IncomingCall(request) => request.reject(),
                _ => {}
            }
            return;
        }

        match event {
            EndpointEvent::Ready(id) => {
                self.ready = true;
                info!(target: "Session", "Registered as {id}");
                self.show_idle_status();
                if let Some(reply) = self.pending_register.take() {
                    let _ = reply.send(Ok(id));
                }
            }
            EndpointEvent::Error(TransportError::UnavailableId(id)) => {
                error!(target: "Session", "Identifier {id} is already in use");
                let err = self.identifier_taken();
                self.close_endpoint();
                if let Some(reply) = self.pending_register.take() {
                    let _ = reply.send(Err(err));
                }
            }
            EndpointEvent::Error(TransportError::PeerUnavailable(remote)) => {
                error!(target: "Session", "Peer {remote} is unavailable");
                self.deps.presentation.show_status(&Status::error(format!(
                    "{} is unavailable",
                    remote.display_number()
                )));
                let dialing = self
                    .connection
                    .as_ref()
                    .is_some_and(|c| c.info.remote_id == remote);
                if dialing && self.state.is_connecting() {
                    self.teardown_connection(CloseReason::TransportError, false);
                }
            }
            EndpointEvent::Error(e) => {
                error!(target: "Session", "Peer error: {e}");
                self.deps.presentation.show_status(&Status::error(&e));
                if !self.ready
                    && let Some(reply) = self.pending_register.take()
                {
                    let _ = reply.send(Err(e.into()));
                }
            }
            EndpointEvent::IncomingConnection(link) => self.accept_inbound(link),
            EndpointEvent::IncomingCall(request) => self.on_incoming_call(request),
        }
    }

    // --- Contacts ---

    async fn add_contact(&mut self, name: &str, phone: &str) -> Result<Contact, SessionError> {
        let contact = self.registry.add_contact(name, phone)?;
        info!(target: "Session", "Added contact {} ({})", contact.name, contact.id);
        self.persist_contacts().await;
        Ok(contact)
    }

    async fn delete_contact(&mut self, id: &PeerId) -> Result<Contact, SessionError> {
        let contact = self.registry.delete_contact(id)?;
        info!(target: "Session", "Deleted contact {} ({})", contact.name, contact.id);
        self.persist_contacts().await;
        Ok(contact)
    }

    async fn persist_contacts(&self) {
        if let Err(e) = self.deps.store.save_contacts(self.registry.contacts()).await {
            warn!(target: "Session", "Failed to persist contacts: {e}");
        }
    }

    // --- Connections ---

    fn connect_to(&mut self, id: PeerId, name: String) -> Result<(), SessionError> {
        if self.identifier_conflict {
            return Err(SessionError::IdentifierConflict(
                self.registry.local_number().unwrap_or_default(),
            ));
        }
        let endpoint = match &self.endpoint {
            Some(endpoint) if self.ready => endpoint.clone(),
            _ => return Err(SessionError::NotRegistered),
        };
        if self.state.is_live() && self.live_peer() == Some(&id) {
            debug!(target: "Session", "Already connected to {id}");
            return Ok(());
        }

        info!(target: "Session", "Connecting to: {name} ({id})");
        self.deps.presentation.show_status(&Status::calling(&name));
        let link = endpoint.connect(&id).inspect_err(|e| {
            error!(target: "Session", "Failed to connect to {id}: {e}");
            self.deps.presentation.show_status(&Status::error(e));
        })?;
        self.install_connection(link, name, Direction::Outgoing)
    }

    fn accept_inbound(&mut self, link: ConnectionLink) {
        let remote = link.handle.remote_id().clone();
        info!(target: "Session", "Incoming connection from: {remote}");

        if self.dialing(&remote) {
            self.resolve_crossed_dial(link);
            return;
        }
        if let Some(contact) = self.registry.find(&remote) {
            let name = contact.name.clone();
            if let Err(e) = self.install_connection(link, name, Direction::Incoming) {
                error!(target: "Session", "Failed to accept connection from {remote}: {e}");
            }
            return;
        }

        let ticket = self.next_generation();
        self.pending_inbound.insert(ticket, link);
        let display = remote.display_number();
        let presentation = self.deps.presentation.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let accepted = presentation.confirm_inbound(&display).await;
            let _ = events.send(SessionEvent::InboundDecision { ticket, accepted });
        });
    }

    /// True while our own outgoing link to `remote` is live.
    fn dialing(&self, remote: &PeerId) -> bool {
        self.state.is_live()
            && self
                .connection
                .as_ref()
                .is_some_and(|c| c.direction == Direction::Outgoing && &c.info.remote_id == remote)
    }

    fn live_peer(&self) -> Option<&PeerId> {
        self.connection.as_ref().map(|c| &c.info.remote_id)
    }

    /// Both sides dialed each other. The link dialed by the smaller
    /// identifier survives on both ends.
    fn resolve_crossed_dial(&mut self, link: ConnectionLink) {
        let remote = link.handle.remote_id().clone();
        let keep_ours = self.registry.local_id().is_some_and(|local| local < remote);
        if keep_ours {
            info!(target: "Session", "Crossed dial with {remote}, keeping our link");
            if let Err(e) = link.handle.close() {
                debug!(target: "Session", "Closing crossed connection: {e}");
            }
            return;
        }
        info!(target: "Session", "Crossed dial with {remote}, taking their link");
        let name = self.peer_name();
        if let Err(e) = self.install_connection(link, name, Direction::Incoming) {
            error!(target: "Session", "Failed to accept connection from {remote}: {e}");
        }
    }

    fn on_inbound_decision(&mut self, ticket: u64, accepted: bool) {
        let Some(link) = self.pending_inbound.remove(&ticket) else {
            return;
        };
        let remote = link.handle.remote_id().clone();
        if !accepted {
            info!(target: "Session", "Declined connection from {remote}");
            if let Err(e) = link.handle.close() {
                debug!(target: "Session", "Closing declined connection: {e}");
            }
            return;
        }
        let name = remote.display_number();
        if let Err(e) = self.install_connection(link, name, Direction::Incoming) {
            error!(target: "Session", "Failed to accept connection from {remote}: {e}");
        }
    }

    /// Put `link` into the connection slot, closing whatever held it.
    fn install_connection(
        &mut self,
        link: ConnectionLink,
        name: String,
        direction: Direction,
    ) -> Result<(), SessionError> {
        if self.connection.is_some() || self.state.is_live() {
            self.teardown_connection(CloseReason::Replaced, false);
        }
        let transition = match direction {
            Direction::Outgoing => ConnectionTransition::Dial,
            Direction::Incoming => ConnectionTransition::Accept,
        };
        if let Err(e) = self.state.apply(transition) {
            let _ = link.handle.close();
            return Err(e.into());
        }

        let generation = self.next_generation();
        let remote = link.handle.remote_id().clone();
        forward(
            link.events,
            self.events.clone(),
            move |event| SessionEvent::Connection { generation, event },
            SessionEvent::Connection {
                generation,
                event: ConnectionEvent::Closed,
            },
        );
        self.connection = Some(ActiveConnection {
            generation,
            handle: link.handle,
            info: ConnectionInfo::new(remote, name),
            direction,
        });
        Ok(())
    }

    pub(super) fn is_current_connection(&self, generation: u64) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }

    /// Generation of the connection, if it is open.
    pub(super) fn open_connection(&self) -> Option<u64> {
        match &self.connection {
            Some(active) if self.state.is_open() => Some(active.generation),
            _ => None,
        }
    }

    pub(super) fn peer_name(&self) -> String {
        self.connection
            .as_ref()
            .map(|c| c.info.remote_name.clone())
            .unwrap_or_default()
    }

    fn on_connection_event(&mut self, generation: u64, event: ConnectionEvent) {
        if !self.is_current_connection(generation) {
            debug!(target: "Session", "Ignoring {event:?} from a replaced connection");
            return;
        }
        match event {
            ConnectionEvent::Opened => self.on_connection_open(),
            ConnectionEvent::Data(payload) => match ControlMessage::decode(&payload) {
                Ok(Some(message)) => self.on_control_message(message),
                Ok(None) => debug!(target: "Session", "Ignoring unknown message: {payload}"),
                Err(e) => warn!(target: "Session", "Malformed control message: {e}"),
            },
            ConnectionEvent::Closed => {
                info!(target: "Session", "Connection closed");
                self.teardown_connection(CloseReason::RemoteClosed, false);
            }
            ConnectionEvent::Error(e) => {
                error!(target: "Session", "Connection error: {e}");
                self.deps.presentation.show_status(&Status::error(&e));
                self.teardown_connection(CloseReason::TransportError, false);
            }
        }
    }

    fn on_connection_open(&mut self) {
        if let Err(e) = self.state.apply(ConnectionTransition::Opened) {
            warn!(target: "Session", "Ignoring open: {e}");
            return;
        }
        let name = self.peer_name();
        info!(target: "Session", "Connected to {name}");

        let presentation = &self.deps.presentation;
        presentation.show_status(&Status::connected(&name));
        presentation.set_ptt_enabled(true);
        presentation.set_audio_status(&AudioStatus::Ready);
        presentation.show_surfaces(&name);

        match self.location.announcement() {
            Some(fix) => {
                if let Err(e) = self.send_control(&ControlMessage::Location { location: fix }) {
                    warn!(target: "Session", "Failed to share location: {e}");
                }
            }
            None => self.request_location_fix(),
        }
        self.refresh_map();
    }

    fn on_control_message(&mut self, message: ControlMessage) {
        debug!(target: "Session", "Received {}", message.kind());
        match message {
            ControlMessage::PttStart => {
                self.ptt.set_peer_transmitting(true);
                let name = self.peer_name();
                self.deps
                    .presentation
                    .set_audio_status(&AudioStatus::PeerTransmitting(name));
            }
            ControlMessage::PttStop => {
                self.ptt.set_peer_transmitting(false);
                self.deps.presentation.set_audio_status(&AudioStatus::Ready);
            }
            ControlMessage::Location { location } => {
                info!(target: "Session", "Received friend location: {location:?}");
                self.location.set_peer(location);
                self.refresh_map();
            }
            ControlMessage::Disconnect => {
                info!(target: "Session", "Peer is disconnecting");
            }
        }
    }

    pub(super) fn send_control(&self, message: &ControlMessage) -> Result<(), SessionError> {
        let Some(active) = &self.connection else {
            return Err(SessionError::Transport(TransportError::ChannelClosed));
        };
        let payload = message.encode()?;
        active.handle.send(&payload)?;
        debug!(target: "Session", "Sent {}", message.kind());
        Ok(())
    }

    /// Empty the connection slot and return it to idle.
    fn teardown_connection(&mut self, reason: CloseReason, notify_peer: bool) -> Vec<SessionError> {
        let mut failures = Vec::new();
        if self.ptt.is_transmitting() {
            self.stop_transmission();
        }
        self.cancel_pending_start();

        if let Some(active) = self.connection.take() {
            if notify_peer && self.state.is_open() {
                let message = ControlMessage::Disconnect.encode().map_err(SessionError::from);
                if let Err(e) = message.and_then(|m| active.handle.send(&m).map_err(Into::into)) {
                    failures.push(e);
                }
            }
            if reason != CloseReason::RemoteClosed {
                match active.handle.close() {
                    Ok(()) => debug!(target: "Session", "Closed connection to {}", active.info.remote_id),
                    Err(e) => failures.push(SessionError::release("connection", e)),
                }
            }
        }

        if self.state.is_live() {
            let _ = self.state.apply(ConnectionTransition::Close { reason });
        }
        if self.state.is_closed() {
            debug!(target: "Session", "Connection closed: {:?}", self.state);
            let _ = self.state.apply(ConnectionTransition::Reset);
        }

        self.ptt.set_peer_transmitting(false);
        self.location.clear_peer();
        let presentation = &self.deps.presentation;
        presentation.set_ptt_enabled(false);
        presentation.set_audio_status(&AudioStatus::Unavailable);
        presentation.hide_surfaces();
        if matches!(reason, CloseReason::RemoteClosed | CloseReason::LocalDisconnect) {
            self.show_idle_status();
        }
        failures
    }

    fn has_active_resources(&self) -> bool {
        self.connection.is_some()
            || self.state.is_live()
            || self.call.is_some()
            || self.ptt.holds_resources()
    }

    /// Tear down everything: transmission, call, connection and microphone.
    ///
    /// Every step runs even if an earlier one fails. Failures are logged,
    /// never returned to the caller.
    pub(super) fn disconnect(&mut self) -> Vec<SessionError> {
        if !self.has_active_resources() {
            debug!(target: "Session", "Nothing to disconnect");
            return Vec::new();
        }
        info!(target: "Session", "Initiating disconnect...");
        let mut failures = Vec::new();

        if self.ptt.is_transmitting() {
            self.stop_transmission();
        }
        self.cancel_pending_start();

        if let Some(call) = self.call.take() {
            match call.handle.close() {
                Ok(()) => info!(target: "Session", "Call with {} closed", call.remote),
                Err(e) => failures.push(SessionError::release("call", e)),
            }
        }
        if self.connection.is_some() || self.state.is_live() {
            failures.extend(self.teardown_connection(CloseReason::LocalDisconnect, true));
        }
        failures.extend(self.release_microphone());

        self.location.clear_peer();
        let presentation = &self.deps.presentation;
        presentation.hide_surfaces();
        presentation.set_ptt_enabled(false);
        presentation.set_audio_status(&AudioStatus::Unavailable);
        self.show_idle_status();

        for failure in &failures {
            error!(target: "Session", "Error during disconnect: {failure}");
        }
        info!(target: "Session", "Disconnect complete");
        failures
    }

    fn shutdown(&mut self) {
        info!(target: "Session", "Shutting down session");
        self.disconnect();
        for (_, link) in self.pending_inbound.drain() {
            let _ = link.handle.close();
        }
        self.close_endpoint();
        if let Some(reply) = self.pending_register.take() {
            let _ = reply.send(Err(SessionError::Closed));
        }
        for waiter in self.location_waiters.drain(..) {
            let _ = waiter.send(Err(SessionError::Closed));
        }
    }

    pub(super) fn show_idle_status(&self) {
        let status = match self.registry.local_number() {
            Some(number) if self.ready => Status::ready(&number),
            _ => Status::welcome(),
        };
        self.deps.presentation.show_status(&status);
    }

    // --- Location ---

    fn request_location(&mut self, reply: Reply<LocationFix>) {
        if let Some(fix) = self.location.mine() {
            let _ = reply.send(Ok(fix));
            return;
        }
        self.location_waiters.push(reply);
        self.request_location_fix();
    }

    fn request_location_fix(&mut self) {
        if !self.location.begin_request() {
            return;
        }
        info!(target: "Session/Location", "Requesting location...");
        let provider = self.deps.location.clone();
        let options = self.config.location.clone();
        let fallback = self.config.default_location;
        let events = self.events.clone();
        tokio::spawn(async move {
            let fix = resolve_fix(provider, options, fallback).await;
            let _ = events.send(SessionEvent::LocationResolved(fix));
        });
    }

    fn on_location_resolved(&mut self, fix: LocationFix) {
        self.location.complete_request(fix);
        for waiter in self.location_waiters.drain(..) {
            let _ = waiter.send(Ok(fix));
        }
        if self.state.is_open() {
            self.refresh_map();
        }
    }

    fn refresh_map(&self) {
        self.deps
            .presentation
            .refresh_map(self.location.mine(), self.location.peer());
    }

    fn snapshot(&self) -> SessionSnapshot {
        let info = self.connection.as_ref().map(|c| &c.info);
        SessionSnapshot {
            local_id: self.registry.local_id(),
            local_number: self.registry.local_number(),
            registered: self.ready,
            identifier_conflict: self.identifier_conflict,
            connection: self.state.clone(),
            peer_id: info.map(|i| i.remote_id.clone()),
            peer_name: info.map(|i| i.remote_name.clone()),
            has_call: self.call.is_some(),
            transmission: self.ptt.state(),
            remote: self.ptt.remote(),
            microphone_held: self.ptt.microphone().is_some(),
            my_location: self.location.mine(),
            peer_location: self.location.peer(),
            contacts: self.registry.contacts().to_vec(),
            pending_inbound: self.pending_inbound.len(),
        }
    }

    pub(super) fn endpoint(&self) -> Option<Arc<dyn SignalingEndpoint>> {
        self.endpoint.clone()
    }
}
