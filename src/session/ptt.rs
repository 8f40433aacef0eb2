//! Push-to-talk transmission and the audio call that carries it.
//!
//! Pressing starts a transmission on the open connection: the microphone is
//! acquired once and kept, `ptt-start` is sent, and an audio call to the
//! peer carries the stream. Releasing, or the transmission ceiling, ends it
//! with exactly one `ptt-stop`. The call itself outlives the transmission
//! and is only replaced by the next one or closed on disconnect.

use super::error::SessionError;
use super::manager::{ActiveCall, SessionActor, forward};
use super::messages::{Reply, SessionEvent};
use super::protocol::ControlMessage;
use super::state::Direction;
use crate::identity::PeerId;
use crate::media::{MediaError, Microphone, ensure_running};
use crate::presentation::{AudioStatus, Status};
use crate::signaling::{CallEvent, CallLink, CallRequest};
use log::{debug, error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum TransmissionState {
    #[default]
    Idle,
    Transmitting,
}

/// What the peer is doing, as last announced over the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum RemoteIndicator {
    #[default]
    Idle,
    PeerTransmitting,
}

/// A press waiting for the microphone.
struct PendingStart {
    connection: u64,
    reply: Reply<()>,
}

/// An inbound call waiting for the microphone.
struct PendingAnswer {
    connection: u64,
    request: Box<dyn CallRequest>,
}

pub(crate) struct PttController {
    state: TransmissionState,
    remote: RemoteIndicator,
    microphone: Option<Microphone>,
    /// Bumped whenever the microphone is released; acquisitions started
    /// under an older epoch are discarded on arrival.
    epoch: u64,
    acquiring: bool,
    transmission: u64,
    pending_start: Option<PendingStart>,
    pending_answers: Vec<PendingAnswer>,
}

impl PttController {
    pub(super) fn new() -> Self {
        Self {
            state: TransmissionState::Idle,
            remote: RemoteIndicator::Idle,
            microphone: None,
            epoch: 0,
            acquiring: false,
            transmission: 0,
            pending_start: None,
            pending_answers: Vec::new(),
        }
    }

    pub(super) fn state(&self) -> TransmissionState {
        self.state
    }

    pub(super) fn remote(&self) -> RemoteIndicator {
        self.remote
    }

    pub(super) fn is_transmitting(&self) -> bool {
        self.state == TransmissionState::Transmitting
    }

    pub(super) fn microphone(&self) -> Option<&Microphone> {
        self.microphone.as_ref()
    }

    pub(super) fn set_peer_transmitting(&mut self, transmitting: bool) {
        self.remote = if transmitting {
            RemoteIndicator::PeerTransmitting
        } else {
            RemoteIndicator::Idle
        };
    }

    /// True while anything here needs releasing on disconnect.
    pub(super) fn holds_resources(&self) -> bool {
        self.is_transmitting()
            || self.microphone.is_some()
            || self.acquiring
            || self.pending_start.is_some()
            || !self.pending_answers.is_empty()
    }

    fn begin(&mut self) -> u64 {
        self.transmission += 1;
        self.state = TransmissionState::Transmitting;
        self.transmission
    }

    /// Returns false if nothing was being transmitted.
    fn end(&mut self) -> bool {
        if self.state == TransmissionState::Idle {
            return false;
        }
        self.state = TransmissionState::Idle;
        true
    }
}

impl SessionActor {
    pub(super) async fn start_transmission(&mut self, reply: Reply<()>) {
        if self.ptt.is_transmitting() || self.ptt.pending_start.is_some() {
            debug!(target: "Session/Ptt", "Already transmitting");
            let _ = reply.send(Ok(()));
            return;
        }
        let Some(connection) = self.open_connection() else {
            debug!(target: "Session/Ptt", "No open connection; ignoring start");
            let _ = reply.send(Ok(()));
            return;
        };

        if self.ptt.microphone.is_some() {
            let result = self.begin_transmission().await;
            let _ = reply.send(result);
        } else {
            self.ptt.pending_start = Some(PendingStart { connection, reply });
            self.acquire_microphone();
        }
    }

    async fn begin_transmission(&mut self) -> Result<(), SessionError> {
        let (stream, pipeline) = match &self.ptt.microphone {
            Some(mic) => (mic.stream.clone(), mic.pipeline.clone()),
            None => {
                return Err(SessionError::DeviceUnavailable(
                    "microphone not acquired".into(),
                ));
            }
        };
        let (Some(endpoint), Some(remote)) = (
            self.endpoint(),
            self.connection.as_ref().map(|c| c.info.remote_id.clone()),
        ) else {
            return Err(SessionError::NotRegistered);
        };

        if let Err(e) = ensure_running(pipeline.as_ref()).await {
            error!(target: "Session/Ptt", "Transmission error: {e}");
            return Err(e.into());
        }

        let transmission = self.ptt.begin();
        self.deps
            .presentation
            .set_audio_status(&AudioStatus::Transmitting);
        if let Err(e) = self.send_control(&ControlMessage::PttStart) {
            warn!(target: "Session/Ptt", "Failed to announce transmission: {e}");
        }

        match endpoint.call(&remote, &stream) {
            Ok(link) => self.install_call(link, remote, Direction::Outgoing),
            Err(e) => {
                error!(target: "Session/Ptt", "Transmission error: {e}");
                self.stop_transmission();
                return Err(e.into());
            }
        }

        let events = self.events.clone();
        let limit = self.config.max_transmission;
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            let _ = events.send(SessionEvent::TransmissionDeadline { transmission });
        });
        info!(target: "Session/Ptt", "Started transmission");
        Ok(())
    }

    /// End the transmission. A press still waiting for the microphone is
    /// cancelled instead.
    pub(super) fn stop_transmission(&mut self) {
        if let Some(pending) = self.ptt.pending_start.take() {
            debug!(target: "Session/Ptt", "Released before the microphone was ready");
            let _ = pending.reply.send(Ok(()));
        }
        if !self.ptt.end() {
            return;
        }
        let status = if self.open_connection().is_some() {
            AudioStatus::Ready
        } else {
            AudioStatus::Unavailable
        };
        self.deps.presentation.set_audio_status(&status);
        if self.connection.is_some()
            && let Err(e) = self.send_control(&ControlMessage::PttStop)
        {
            warn!(target: "Session/Ptt", "Failed to announce end of transmission: {e}");
        }
        info!(target: "Session/Ptt", "Stopped transmission");
    }

    pub(super) fn on_transmission_deadline(&mut self, transmission: u64) {
        if self.ptt.is_transmitting() && self.ptt.transmission == transmission {
            info!(
                target: "Session/Ptt",
                "Transmission reached {}s, stopping",
                self.config.max_transmission.as_secs()
            );
            self.stop_transmission();
        } else {
            debug!(target: "Session/Ptt", "Ignoring timer for transmission #{transmission}");
        }
    }

    pub(super) fn cancel_pending_start(&mut self) {
        if let Some(pending) = self.ptt.pending_start.take() {
            let _ = pending.reply.send(Ok(()));
        }
    }

    fn acquire_microphone(&mut self) {
        if self.ptt.acquiring {
            return;
        }
        self.ptt.acquiring = true;
        let epoch = self.ptt.epoch;
        let capture = self.deps.capture.clone();
        let constraints = self.config.microphone.clone();
        let events = self.events.clone();
        debug!(target: "Session/Ptt", "Requesting microphone");
        tokio::spawn(async move {
            let result = capture.acquire_microphone(&constraints).await;
            let _ = events.send(SessionEvent::MicrophoneReady { epoch, result });
        });
    }

    pub(super) async fn on_microphone_ready(
        &mut self,
        epoch: u64,
        result: Result<Microphone, MediaError>,
    ) {
        if epoch != self.ptt.epoch {
            debug!(target: "Session/Ptt", "Discarding microphone from a released session");
            if let Ok(mic) = result {
                for e in mic.release() {
                    warn!(target: "Session/Ptt", "Failed to release late microphone: {e}");
                }
            }
            return;
        }
        self.ptt.acquiring = false;

        match result {
            Ok(mic) => {
                info!(target: "Session/Ptt", "Microphone ready ({})", mic.stream.id());
                self.ptt.microphone = Some(mic);
            }
            Err(e) => {
                error!(target: "Session/Ptt", "Microphone error: {e}");
                self.deps.presentation.show_status(&Status::error(format!(
                    "microphone access is required for push-to-talk ({e})"
                )));
                if let Some(pending) = self.ptt.pending_start.take() {
                    let _ = pending.reply.send(Err(e.clone().into()));
                }
                for pending in self.ptt.pending_answers.drain(..) {
                    warn!(
                        target: "Session/Ptt",
                        "Leaving call from {} unanswered", pending.request.remote_id()
                    );
                }
                return;
            }
        }

        if let Some(pending) = self.ptt.pending_start.take() {
            let result = if self.open_connection() == Some(pending.connection) {
                self.begin_transmission().await
            } else {
                debug!(target: "Session/Ptt", "Connection changed while waiting for the microphone");
                Ok(())
            };
            let _ = pending.reply.send(result);
        }
        for pending in std::mem::take(&mut self.ptt.pending_answers) {
            self.answer_call(pending.connection, pending.request);
        }
    }

    /// Stop the microphone and forget any acquisition still in flight.
    pub(super) fn release_microphone(&mut self) -> Vec<SessionError> {
        self.ptt.epoch += 1;
        self.ptt.acquiring = false;
        self.ptt.pending_answers.clear();
        let Some(mic) = self.ptt.microphone.take() else {
            return Vec::new();
        };
        let failures: Vec<SessionError> = mic
            .release()
            .into_iter()
            .map(|e| SessionError::release("microphone", e))
            .collect();
        if failures.is_empty() {
            info!(target: "Session/Ptt", "Microphone released");
        }
        failures
    }

    // --- Calls ---

    /// Inbound calls are only answered from the peer we are connected to.
    pub(super) fn on_incoming_call(&mut self, request: Box<dyn CallRequest>) {
        let remote = request.remote_id().clone();
        info!(target: "Session/Call", "Incoming call from: {remote}");
        let connection = self
            .connection
            .as_ref()
            .filter(|c| c.info.remote_id == remote)
            .map(|c| c.generation);
        let Some(connection) = connection else {
            warn!(target: "Session/Call", "Rejecting call from {remote}: not connected to them");
            request.reject();
            return;
        };

        if self.ptt.microphone.is_some() {
            self.answer_call(connection, request);
        } else {
            self.ptt.pending_answers.push(PendingAnswer {
                connection,
                request,
            });
            self.acquire_microphone();
        }
    }

    fn answer_call(&mut self, connection: u64, request: Box<dyn CallRequest>) {
        let remote = request.remote_id().clone();
        if !self.is_current_connection(connection) {
            info!(target: "Session/Call", "Connection to {remote} ended before the call was answered");
            request.reject();
            return;
        }
        let Some(stream) = self.ptt.microphone.as_ref().map(|m| m.stream.clone()) else {
            warn!(target: "Session/Call", "No microphone to answer {remote} with");
            request.reject();
            return;
        };
        match request.answer(&stream) {
            Ok(link) => {
                info!(target: "Session/Call", "Answered call from {remote}");
                self.install_call(link, remote, Direction::Incoming);
            }
            Err(e) => {
                error!(target: "Session/Call", "Failed to answer call from {remote}: {e}");
                self.deps.presentation.show_status(&Status::error(&e));
            }
        }
    }

    fn install_call(&mut self, link: CallLink, remote: PeerId, direction: Direction) {
        if let Some(previous) = self.call.take() {
            debug!(target: "Session/Call", "Replacing call with {}", previous.remote);
            if let Err(e) = previous.handle.close() {
                warn!(target: "Session/Call", "Failed to close previous call: {e}");
            }
        }
        let generation = self.next_generation();
        forward(
            link.events,
            self.events.clone(),
            move |event| SessionEvent::Call { generation, event },
            SessionEvent::Call {
                generation,
                event: CallEvent::Closed,
            },
        );
        self.call = Some(ActiveCall {
            generation,
            handle: link.handle,
            remote,
            direction,
        });
    }

    pub(super) fn on_call_event(&mut self, generation: u64, event: CallEvent) {
        let Some(call) = self.call.as_ref().filter(|c| c.generation == generation) else {
            debug!(target: "Session/Call", "Ignoring {event:?} from a replaced call");
            return;
        };
        match event {
            CallEvent::RemoteStream(stream) => {
                info!(target: "Session/Call", "Received remote audio stream from {}", call.remote);
                if let Err(e) = self.deps.output.play(stream) {
                    error!(target: "Session/Call", "Audio play error: {e}");
                }
            }
            CallEvent::Closed => {
                info!(target: "Session/Call", "{:?} call with {} ended", call.direction, call.remote);
                self.call = None;
            }
            CallEvent::Error(e) => {
                error!(target: "Session/Call", "Call error: {e}");
                self.call = None;
            }
        }
    }
}
