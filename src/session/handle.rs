use super::error::SessionError;
use super::manager::{Collaborators, SessionActor};
use super::messages::{Reply, SessionCommand, SessionSnapshot};
use crate::config::SessionConfig;
use crate::identity::PeerId;
use crate::location::{FixedLocation, LocationFix, LocationProvider};
use crate::media::{AudioOutput, LoggingOutput, MediaCapture};
use crate::presentation::{LogPresentation, Presentation};
use crate::registry::{Contact, SessionRegistry};
use crate::signaling::SignalingFactory;
use crate::store::{MemoryStore, RegistryStore};
use anyhow::{Result, anyhow};
use log::{error, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Cheap, cloneable way to drive a running session.
///
/// Every method resolves once the session has processed the request.
/// After shutdown they fail with [`SessionError::Closed`].
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Set the local number and open the signaling endpoint under the
    /// identifier derived from it. Resolves once the rendezvous accepts or
    /// refuses the identifier.
    pub async fn register(&self, phone: &str) -> Result<PeerId, SessionError> {
        let phone = phone.to_string();
        self.request(|reply| SessionCommand::Register { phone, reply })
            .await
    }

    pub async fn add_contact(&self, name: &str, phone: &str) -> Result<Contact, SessionError> {
        let (name, phone) = (name.to_string(), phone.to_string());
        self.request(|reply| SessionCommand::AddContact { name, phone, reply })
            .await
    }

    pub async fn delete_contact(&self, id: &PeerId) -> Result<Contact, SessionError> {
        let id = id.clone();
        self.request(|reply| SessionCommand::DeleteContact { id, reply })
            .await
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>, SessionError> {
        Ok(self.snapshot().await?.contacts)
    }

    /// Dial `id`, replacing any current connection. Resolves once the
    /// request is issued; the connection reports open asynchronously.
    pub async fn connect_to(&self, id: &PeerId, name: &str) -> Result<(), SessionError> {
        let (id, name) = (id.clone(), name.to_string());
        self.request(|reply| SessionCommand::ConnectTo { id, name, reply })
            .await
    }

    pub async fn connect_contact(&self, contact: &Contact) -> Result<(), SessionError> {
        self.connect_to(&contact.id, &contact.name).await
    }

    /// Release the transmission, call, connection and microphone.
    /// A no-op when nothing is held.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Disconnect { reply })
            .await
    }

    /// Press the talk button. Ignored without an open connection or while
    /// already transmitting.
    pub async fn start_transmission(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::StartTransmission { reply })
            .await
    }

    /// Release the talk button. Ignored when not transmitting.
    pub async fn stop_transmission(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::StopTransmission { reply })
            .await
    }

    /// Our location, resolving it first if needed. Never fails for lack of
    /// a reading; the configured default is used instead.
    pub async fn request_location(&self) -> Result<LocationFix, SessionError> {
        self.request(|reply| SessionCommand::RequestLocation { reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Shutdown { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// A running session: its handle and the actor task.
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Release everything, leave the rendezvous and wait for the actor to
    /// finish.
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.shutdown().await {
            warn!(target: "Session", "Shutdown request failed: {e}");
        }
        if let Err(e) = self.task.await {
            error!(target: "Session", "Session task failed: {e}");
        }
    }
}

pub struct SessionBuilder {
    config: SessionConfig,
    store: Option<Arc<dyn RegistryStore>>,
    signaling: Option<Arc<dyn SignalingFactory>>,
    capture: Option<Arc<dyn MediaCapture>>,
    output: Option<Arc<dyn AudioOutput>>,
    location: Option<Arc<dyn LocationProvider>>,
    presentation: Option<Arc<dyn Presentation>>,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            store: None,
            signaling: None,
            capture: None,
            output: None,
            location: None,
            presentation: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RegistryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_signaling(mut self, signaling: Arc<dyn SignalingFactory>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn MediaCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_location(mut self, location: Arc<dyn LocationProvider>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_presentation(mut self, presentation: Arc<dyn Presentation>) -> Self {
        self.presentation = Some(presentation);
        self
    }

    /// Restore the registry from the store and start the session.
    ///
    /// A saved number is registered right away. Signaling and capture are
    /// required; the rest fall back to an in-memory store, a logging
    /// presentation that declines unknown callers, a logging output and
    /// the configured default location.
    pub async fn build(self) -> Result<Session> {
        let signaling = self
            .signaling
            .ok_or_else(|| anyhow!("a signaling factory is required, use with_signaling()"))?;
        let capture = self
            .capture
            .ok_or_else(|| anyhow!("a media capture is required, use with_capture()"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RegistryStore>);

        let phone = store.load_phone().await?;
        let contacts = match store.load_contacts().await {
            Ok(contacts) => contacts,
            Err(e) => {
                error!(target: "Session", "Error parsing saved contacts, starting empty: {e}");
                Vec::new()
            }
        };
        let registry = SessionRegistry::restore(phone, contacts);

        let config = self.config;
        let deps = Collaborators {
            store,
            signaling,
            capture,
            output: self
                .output
                .unwrap_or_else(|| Arc::new(LoggingOutput) as Arc<dyn AudioOutput>),
            location: self
                .location
                .unwrap_or_else(|| {
                    Arc::new(FixedLocation::at(config.default_location)) as Arc<dyn LocationProvider>
                }),
            presentation: self
                .presentation
                .unwrap_or_else(|| Arc::new(LogPresentation::new(false)) as Arc<dyn Presentation>),
        };

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let actor = SessionActor::new(config, deps, registry, event_tx);
        let task = tokio::spawn(actor.run(command_rx, event_rx));

        Ok(Session {
            handle: SessionHandle {
                commands: command_tx,
            },
            task,
        })
    }
}
