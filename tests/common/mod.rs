#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use wheru::location::{FixedLocation, LocationFix};
use wheru::loopback::LoopbackNetwork;
use wheru::media::{
    AudioConstraints, AudioOutput, MediaCapture, MediaError, MediaStream, Microphone,
    VirtualPipeline, VirtualTrack,
};
use wheru::presentation::{AudioStatus, Presentation, Status};
use wheru::session::ControlMessage;
use wheru::signaling::{
    CallHandle, CallLink, ConnectionEvent, ConnectionLink, EndpointEvent, EventStream, IceConfig,
    SignalingEndpoint, SignalingFactory, TransportError,
};
use wheru::store::{MemoryStore, RegistryStore};
use wheru::{PeerId, Session, SessionHandle, SessionSnapshot};

pub const FIX: LocationFix = LocationFix::new(37.7749, -122.4194);

/// Records everything the session renders.
#[derive(Default)]
pub struct RecordingPresentation {
    accept_unknown: AtomicBool,
    pub statuses: Mutex<Vec<Status>>,
    pub audio: Mutex<Vec<AudioStatus>>,
    pub prompts: Mutex<Vec<String>>,
    pub maps: Mutex<Vec<(Option<LocationFix>, Option<LocationFix>)>>,
    pub surfaces: Mutex<Option<String>>,
    pub ptt_enabled: AtomicBool,
}

impl RecordingPresentation {
    pub fn accepting(accept: bool) -> Arc<Self> {
        let presentation = Self::default();
        presentation.accept_unknown.store(accept, Ordering::SeqCst);
        Arc::new(presentation)
    }

    pub fn last_status(&self) -> Option<Status> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn last_audio(&self) -> Option<AudioStatus> {
        self.audio.lock().unwrap().last().cloned()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
            + self.audio.lock().unwrap().len()
            + self.maps.lock().unwrap().len()
    }
}

#[async_trait]
impl Presentation for RecordingPresentation {
    fn show_status(&self, status: &Status) {
        self.statuses.lock().unwrap().push(status.clone());
    }

    fn set_audio_status(&self, status: &AudioStatus) {
        self.audio.lock().unwrap().push(status.clone());
    }

    fn set_ptt_enabled(&self, enabled: bool) {
        self.ptt_enabled.store(enabled, Ordering::SeqCst);
    }

    fn show_surfaces(&self, peer_name: &str) {
        *self.surfaces.lock().unwrap() = Some(peer_name.to_string());
    }

    fn hide_surfaces(&self) {
        *self.surfaces.lock().unwrap() = None;
    }

    fn refresh_map(&self, mine: Option<LocationFix>, peer: Option<LocationFix>) {
        self.maps.lock().unwrap().push((mine, peer));
    }

    async fn confirm_inbound(&self, display_number: &str) -> bool {
        self.prompts.lock().unwrap().push(display_number.to_string());
        self.accept_unknown.load(Ordering::SeqCst)
    }
}

/// Capture that hands out a microphone only after [`GatedCapture::open`],
/// and counts how often it was asked.
pub struct GatedCapture {
    gate: Semaphore,
    fail: bool,
    pub requests: AtomicUsize,
    pub tracks: Mutex<Vec<Arc<VirtualTrack>>>,
}

impl GatedCapture {
    /// Grants immediately.
    pub fn open_ended() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            fail: false,
            requests: AtomicUsize::new(0),
            tracks: Mutex::new(Vec::new()),
        })
    }

    /// Holds every request until [`GatedCapture::open`].
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            fail: false,
            requests: AtomicUsize::new(0),
            tracks: Mutex::new(Vec::new()),
        })
    }

    /// Refuses every request.
    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            fail: true,
            requests: AtomicUsize::new(0),
            tracks: Mutex::new(Vec::new()),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn all_tracks_stopped(&self) -> bool {
        self.tracks.lock().unwrap().iter().all(|t| t.is_stopped())
    }
}

#[async_trait]
impl MediaCapture for GatedCapture {
    async fn acquire_microphone(
        &self,
        _constraints: &AudioConstraints,
    ) -> Result<Microphone, MediaError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?;
        permit.forget();
        if self.fail {
            return Err(MediaError::PermissionDenied("user dismissed prompt".into()));
        }
        let track = Arc::new(VirtualTrack::default());
        self.tracks.lock().unwrap().push(track.clone());
        Ok(Microphone {
            stream: MediaStream::new(format!("test-mic-{n}")),
            tracks: vec![track],
            pipeline: Arc::new(VirtualPipeline::default()),
        })
    }
}

#[derive(Default)]
pub struct RecordingOutput {
    pub played: Mutex<Vec<MediaStream>>,
}

impl AudioOutput for RecordingOutput {
    fn play(&self, stream: MediaStream) -> Result<(), MediaError> {
        self.played.lock().unwrap().push(stream);
        Ok(())
    }
}

pub struct Harness {
    pub session: Session,
    pub handle: SessionHandle,
    pub presentation: Arc<RecordingPresentation>,
    pub capture: Arc<GatedCapture>,
    pub output: Arc<RecordingOutput>,
}

pub async fn start_session(
    network: &LoopbackNetwork,
    store: Arc<dyn RegistryStore>,
    presentation: Arc<RecordingPresentation>,
    capture: Arc<GatedCapture>,
) -> Harness {
    start_session_on(Arc::new(network.clone()), store, presentation, capture).await
}

pub async fn start_session_on(
    signaling: Arc<dyn SignalingFactory>,
    store: Arc<dyn RegistryStore>,
    presentation: Arc<RecordingPresentation>,
    capture: Arc<GatedCapture>,
) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let output = Arc::new(RecordingOutput::default());
    let session = Session::builder()
        .with_signaling(signaling)
        .with_capture(capture.clone())
        .with_output(output.clone())
        .with_location(Arc::new(FixedLocation::at(FIX)))
        .with_presentation(presentation.clone())
        .with_store(store)
        .build()
        .await
        .unwrap();
    let handle = session.handle();
    Harness {
        session,
        handle,
        presentation,
        capture,
        output,
    }
}

/// Loopback signaling whose outgoing calls refuse to hang up.
pub struct StuckHangup {
    network: LoopbackNetwork,
}

impl StuckHangup {
    pub fn new(network: &LoopbackNetwork) -> Arc<Self> {
        Arc::new(Self {
            network: network.clone(),
        })
    }
}

#[async_trait]
impl SignalingFactory for StuckHangup {
    async fn open(
        &self,
        id: &PeerId,
        ice: &IceConfig,
    ) -> Result<(Arc<dyn SignalingEndpoint>, EventStream<EndpointEvent>), TransportError> {
        let (inner, events) = self.network.open(id, ice).await?;
        Ok((Arc::new(StuckEndpoint { inner }), events))
    }
}

struct StuckEndpoint {
    inner: Arc<dyn SignalingEndpoint>,
}

impl SignalingEndpoint for StuckEndpoint {
    fn id(&self) -> &PeerId {
        self.inner.id()
    }

    fn connect(&self, remote: &PeerId) -> Result<ConnectionLink, TransportError> {
        self.inner.connect(remote)
    }

    fn call(&self, remote: &PeerId, stream: &MediaStream) -> Result<CallLink, TransportError> {
        let link = self.inner.call(remote, stream)?;
        Ok(CallLink {
            handle: Arc::new(StuckCall {
                remote_id: remote.clone(),
            }),
            events: link.events,
        })
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}

struct StuckCall {
    remote_id: PeerId,
}

impl CallHandle for StuckCall {
    fn remote_id(&self) -> &PeerId {
        &self.remote_id
    }

    fn close(&self) -> Result<(), TransportError> {
        Err(TransportError::Other {
            kind: "hangup".into(),
            message: "call is stuck".into(),
        })
    }
}

/// A registered session with default fakes.
pub async fn registered(network: &LoopbackNetwork, phone: &str) -> Harness {
    let harness = start_session(
        network,
        Arc::new(MemoryStore::new()),
        RecordingPresentation::accepting(false),
        GatedCapture::open_ended(),
    )
    .await;
    harness.handle.register(phone).await.unwrap();
    harness
}

/// Poll the session until `check` holds.
pub async fn wait_for(
    handle: &SessionHandle,
    what: &str,
    check: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    for _ in 0..200 {
        let snapshot = handle.snapshot().await.unwrap();
        if check(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// A bare endpoint on the network, used to see exactly what a session sends.
pub struct RawPeer {
    pub endpoint: Arc<dyn SignalingEndpoint>,
    pub events: EventStream<EndpointEvent>,
}

impl RawPeer {
    pub async fn join(network: &LoopbackNetwork, id: &str) -> Self {
        let (endpoint, mut events) = network
            .open(&PeerId::from(id), &IceConfig::default())
            .await
            .unwrap();
        assert!(matches!(events.recv().await, Some(EndpointEvent::Ready(_))));
        Self { endpoint, events }
    }

    pub async fn next_event(&mut self) -> EndpointEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("no endpoint event")
            .expect("endpoint stream ended")
    }

    pub async fn accept_connection(&mut self) -> ConnectionLink {
        loop {
            match self.next_event().await {
                EndpointEvent::IncomingConnection(link) => return link,
                EndpointEvent::IncomingCall(request) => request.reject(),
                other => panic!("unexpected endpoint event: {other:?}"),
            }
        }
    }
}

/// The next control message on `link`, skipping the open notification.
pub async fn next_message(link: &mut ConnectionLink) -> Option<ControlMessage> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), link.events.recv())
            .await
            .ok()??;
        match event {
            ConnectionEvent::Opened => continue,
            ConnectionEvent::Data(payload) => return ControlMessage::decode(&payload).unwrap(),
            ConnectionEvent::Closed | ConnectionEvent::Error(_) => return None,
        }
    }
}

/// Everything already queued on `link`.
pub fn drain_messages(link: &mut ConnectionLink) -> Vec<ControlMessage> {
    let mut messages = Vec::new();
    while let Ok(event) = link.events.try_recv() {
        if let ConnectionEvent::Data(payload) = event
            && let Ok(Some(message)) = ControlMessage::decode(&payload)
        {
            messages.push(message);
        }
    }
    messages
}

/// A session registered as "+1 (555) 123-4567" with Alex ("555-987-6543")
/// in its contacts, connected to a raw peer standing in for Alex.
pub async fn connected_to_alex(
    network: &LoopbackNetwork,
    capture: Arc<GatedCapture>,
) -> (Harness, RawPeer, ConnectionLink) {
    let harness = start_session(
        network,
        Arc::new(MemoryStore::new()),
        RecordingPresentation::accepting(false),
        capture,
    )
    .await;
    harness.handle.register("+1 (555) 123-4567").await.unwrap();
    let mut alex = RawPeer::join(network, "5559876543").await;
    let contact = harness
        .handle
        .add_contact("Alex", "555-987-6543")
        .await
        .unwrap();
    harness.handle.connect_contact(&contact).await.unwrap();
    let link = alex.accept_connection().await;
    wait_for(&harness.handle, "connection to open", |s| s.connection.is_open()).await;
    (harness, alex, link)
}
