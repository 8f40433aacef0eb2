//! Microphone capture and audio routing boundary.
//!
//! The session never touches audio samples. It asks a [`MediaCapture`] for a
//! [`Microphone`] (a local stream plus the pipeline that feeds it), hands the
//! stream to the signaling layer when calling, and routes remote streams to
//! an [`AudioOutput`].

use async_trait::async_trait;
use log::{debug, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("release failed: {0}")]
    Release(String),
}

/// Opaque reference to a media stream understood by the collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaStream {
    id: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Capture settings requested from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: 44_100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Suspended,
    Closed,
}

/// The processing graph the microphone feeds into.
#[async_trait]
pub trait AudioPipeline: Send + Sync {
    fn state(&self) -> PipelineState;

    async fn resume(&self) -> Result<(), MediaError>;

    fn suspend(&self) -> Result<(), MediaError>;

    /// Detach the microphone source node from the graph.
    fn disconnect_source(&self) -> Result<(), MediaError>;
}

pub trait AudioTrack: Send + Sync {
    fn stop(&self) -> Result<(), MediaError>;
}

/// A live microphone acquisition.
pub struct Microphone {
    pub stream: MediaStream,
    pub tracks: Vec<Arc<dyn AudioTrack>>,
    pub pipeline: Arc<dyn AudioPipeline>,
}

impl fmt::Debug for Microphone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Microphone")
            .field("stream", &self.stream)
            .field("tracks", &self.tracks.len())
            .field("pipeline", &self.pipeline.state())
            .finish()
    }
}

/// Make sure the pipeline is running before audio is sent.
pub async fn ensure_running(pipeline: &dyn AudioPipeline) -> Result<(), MediaError> {
    if pipeline.state() == PipelineState::Suspended {
        debug!(target: "Media", "Resuming suspended audio pipeline");
        pipeline.resume().await?;
    }
    Ok(())
}

impl Microphone {
    /// Stop every track, detach the source and suspend the pipeline.
    ///
    /// Every step runs even when an earlier one fails; the failures are
    /// returned for reporting.
    pub fn release(self) -> Vec<MediaError> {
        let mut failures = Vec::new();
        for track in &self.tracks {
            match track.stop() {
                Ok(()) => debug!(target: "Media", "Stopped audio track"),
                Err(e) => failures.push(e),
            }
        }
        if let Err(e) = self.pipeline.disconnect_source() {
            failures.push(e);
        }
        if self.pipeline.state() != PipelineState::Closed
            && let Err(e) = self.pipeline.suspend()
        {
            failures.push(e);
        }
        failures
    }
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire the microphone. Fails with [`MediaError::PermissionDenied`] or
    /// [`MediaError::DeviceUnavailable`].
    async fn acquire_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Microphone, MediaError>;
}

/// Sink for remote audio.
pub trait AudioOutput: Send + Sync {
    fn play(&self, stream: MediaStream) -> Result<(), MediaError>;
}

/// A capture device that produces silent streams. Used by the demo binary
/// and tests that do not care about audio.
#[derive(Debug, Default)]
pub struct VirtualCapture {
    next_stream: AtomicU64,
}

impl VirtualCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaCapture for VirtualCapture {
    async fn acquire_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Microphone, MediaError> {
        let n = self.next_stream.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "Media",
            "Virtual microphone #{n} at {} Hz", constraints.sample_rate
        );
        Ok(Microphone {
            stream: MediaStream::new(format!("virtual-mic-{n}")),
            tracks: vec![Arc::new(VirtualTrack::default())],
            pipeline: Arc::new(VirtualPipeline::default()),
        })
    }
}

#[derive(Debug, Default)]
pub struct VirtualTrack {
    stopped: AtomicBool,
}

impl VirtualTrack {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl AudioTrack for VirtualTrack {
    fn stop(&self) -> Result<(), MediaError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Pipeline state kept in an atomic so it can be shared with observers.
#[derive(Debug, Default)]
pub struct VirtualPipeline {
    state: AtomicU8,
}

impl VirtualPipeline {
    const RUNNING: u8 = 0;
    const SUSPENDED: u8 = 1;
    const CLOSED: u8 = 2;

    pub fn close(&self) {
        self.state.store(Self::CLOSED, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioPipeline for VirtualPipeline {
    fn state(&self) -> PipelineState {
        match self.state.load(Ordering::SeqCst) {
            Self::RUNNING => PipelineState::Running,
            Self::SUSPENDED => PipelineState::Suspended,
            _ => PipelineState::Closed,
        }
    }

    async fn resume(&self) -> Result<(), MediaError> {
        match self.state() {
            PipelineState::Closed => Err(MediaError::DeviceUnavailable(
                "audio pipeline is closed".into(),
            )),
            _ => {
                self.state.store(Self::RUNNING, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<(), MediaError> {
        match self.state() {
            PipelineState::Closed => Err(MediaError::Release("audio pipeline is closed".into())),
            _ => {
                self.state.store(Self::SUSPENDED, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn disconnect_source(&self) -> Result<(), MediaError> {
        Ok(())
    }
}

/// Output that only logs what it would play.
#[derive(Debug, Default)]
pub struct LoggingOutput;

impl AudioOutput for LoggingOutput {
    fn play(&self, stream: MediaStream) -> Result<(), MediaError> {
        info!(target: "Media", "Playing remote stream {}", stream.id());
        Ok(())
    }
}
