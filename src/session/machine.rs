//! Call session state machine
//!
//! ```text
//! Idle → Connecting → Open → Closed
//!                      └──→ Error → Closed
//! ```
//!
//! Devices are acquired eagerly while connecting and producers start queueing
//! media before the remote handle resolves. Every exit path (user stop,
//! remote error, remote close, drop) converges on [`CallSession::teardown`].

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::sink::{OutboundGate, OutboundSink};
use super::transport::{InboundEvent, LiveSession, LiveTransport, ServerMessage};
use crate::codec;
use crate::config::Config;
use crate::devices::MediaDevices;
use crate::media::{Speaker, TranscriptFragment, TranscriptTurn};
use crate::transcript::TranscriptAccumulator;
use crate::video::{FrameSampler, VideoSource};
use crate::voice::{CapturePipeline, PlaybackScheduler};
use crate::{Error, Result};

/// Inbound events buffered between the transport and the dispatch loop
const EVENT_QUEUE: usize = 64;

/// Lifecycle state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Error,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Error => write!(f, "error"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// User-facing notifications emitted during a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A finalized transcript turn
    Turn(TranscriptTurn),
    /// The call failed and is being torn down
    Failure(String),
}

/// How a call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEnd {
    /// Stopped locally
    UserStopped,
    /// The remote side closed the channel
    RemoteClosed { code: Option<u16>, reason: String },
    /// The remote channel reported an error
    Failed(String),
}

/// Result of a finished call
#[derive(Debug, Clone)]
pub struct CallSummary {
    pub call_id: Uuid,
    pub end: CallEnd,
    pub turns: Vec<TranscriptTurn>,
    pub dropped_audio_frames: u64,
}

/// One live call and every resource it owns
pub struct CallSession {
    id: Uuid,
    config: Config,
    devices: Box<dyn MediaDevices>,
    transport: Arc<dyn LiveTransport>,
    state_tx: watch::Sender<SessionState>,
    notices: mpsc::UnboundedSender<Notice>,
    transcript: TranscriptAccumulator,

    capture: Option<CapturePipeline>,
    sampler: Option<FrameSampler>,
    video: Option<Arc<dyn VideoSource>>,
    scheduler: Option<PlaybackScheduler>,
    sink: Option<OutboundSink>,
    gate: Option<OutboundGate>,
    gate_cancel: Option<CancellationToken>,
    session: Option<Arc<dyn LiveSession>>,

    dropped_audio_frames: u64,
    torn_down: bool,
}

impl CallSession {
    #[must_use]
    pub fn new(
        config: Config,
        devices: Box<dyn MediaDevices>,
        transport: Arc<dyn LiveTransport>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            id: Uuid::new_v4(),
            config,
            devices,
            transport,
            state_tx,
            notices,
            transcript: TranscriptAccumulator::new(),
            capture: None,
            sampler: None,
            video: None,
            scheduler: None,
            sink: None,
            gate: None,
            gate_cancel: None,
            session: None,
            dropped_audio_frames: 0,
            torn_down: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Watch lifecycle transitions
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Run the call until the user stops it or the remote side ends it
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if local devices cannot be opened, or
    /// the connect error if the session cannot be established. Failures after
    /// connecting end the call normally with [`CallEnd::Failed`].
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, stop: CancellationToken) -> Result<CallSummary> {
        let span = tracing::info_span!("call", id = %self.id);
        async move {
            let end = self.drive(&stop).await?;
            self.teardown();
            Ok(self.summary(end))
        }
        .instrument(span)
        .await
    }

    #[allow(clippy::future_not_send)]
    async fn drive(&mut self, stop: &CancellationToken) -> Result<CallEnd> {
        self.set_state(SessionState::Connecting);

        if let Err(e) = self.acquire_devices() {
            return Err(self.fail(e));
        }

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE);
        let transport = Arc::clone(&self.transport);
        let live = self.config.live.clone();

        let session = tokio::select! {
            () = stop.cancelled() => {
                tracing::info!("call cancelled while connecting");
                return Ok(CallEnd::UserStopped);
            }
            result = transport.connect(&live, events_tx) => match result {
                Ok(session) => session,
                Err(e) => return Err(self.fail(e)),
            },
        };

        tracing::debug!("live session resolved");
        if let Some(gate) = self.gate.take() {
            self.gate_cancel = Some(gate.cancel_token());
            gate.attach(Arc::clone(&session));
        }
        self.session = Some(session);

        loop {
            let event = tokio::select! {
                () = stop.cancelled() => {
                    tracing::info!("call stopped by user");
                    return Ok(CallEnd::UserStopped);
                }
                event = events_rx.recv() => event,
            };

            let Some(event) = event else {
                tracing::debug!("inbound event stream ended");
                return Ok(CallEnd::RemoteClosed {
                    code: None,
                    reason: "event stream ended".to_string(),
                });
            };

            if let ControlFlow::Break(end) = self.dispatch(event) {
                return Ok(end);
            }
        }
    }

    /// Open devices and attach producers to the outbound queue
    fn acquire_devices(&mut self) -> Result<()> {
        let (sink, gate) = OutboundSink::channel(self.config.live.outbound_queue);
        self.sink = Some(sink.clone());
        self.gate = Some(gate);

        let input = self.devices.audio_input()?;
        let output = self.devices.audio_output()?;
        let video = self.devices.video_source()?;

        self.scheduler = Some(PlaybackScheduler::new(output));

        let mut capture = CapturePipeline::new(input, sink.clone(), self.config.audio.block_size);
        capture.start()?;
        self.capture = Some(capture);

        if let Some(source) = video {
            let mut sampler = FrameSampler::new(
                Arc::clone(&source),
                sink,
                self.config.video.frame_interval,
                self.config.video.jpeg_quality_percent(),
            );
            sampler.start();
            self.sampler = Some(sampler);
            self.video = Some(source);
        }

        tracing::info!(video = self.video.is_some(), "local devices acquired");
        Ok(())
    }

    /// Apply one inbound event
    fn dispatch(&mut self, event: InboundEvent) -> ControlFlow<CallEnd> {
        match event {
            InboundEvent::Open => {
                self.set_state(SessionState::Open);
                tracing::info!("live session open");
                ControlFlow::Continue(())
            }
            InboundEvent::Message(message) => {
                if *self.state_tx.borrow() == SessionState::Open {
                    self.handle_message(message);
                } else {
                    tracing::debug!("ignoring message before session open");
                }
                ControlFlow::Continue(())
            }
            InboundEvent::Error(message) => {
                self.set_state(SessionState::Error);
                tracing::error!(error = %message, "live session error");
                self.notify(Notice::Failure(format!("connection error: {message}")));
                ControlFlow::Break(CallEnd::Failed(message))
            }
            InboundEvent::Close { code, reason } => {
                if code.is_none_or(|c| c == InboundEvent::NORMAL_CLOSE) {
                    tracing::info!(?code, %reason, "live session closed");
                } else {
                    tracing::warn!(?code, %reason, "live session closed unexpectedly");
                    self.notify(Notice::Failure(format!(
                        "connection closed unexpectedly: {reason}"
                    )));
                }
                ControlFlow::Break(CallEnd::RemoteClosed { code, reason })
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        if let Some(text) = message.input_transcription {
            self.transcript
                .push(&TranscriptFragment::new(Speaker::User, text));
        }
        if let Some(text) = message.output_transcription {
            self.transcript
                .push(&TranscriptFragment::new(Speaker::Model, text));
        }

        if let Some(scheduler) = self.scheduler.as_mut() {
            if message.interrupted {
                scheduler.interrupt();
            }

            for audio in &message.audio {
                let rate = codec::parse_pcm_rate(&audio.mime)
                    .unwrap_or(self.config.audio.output_sample_rate);
                let chunk = match codec::decode_audio_chunk(
                    &audio.data,
                    rate,
                    self.config.audio.output_channels,
                ) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed audio chunk");
                        continue;
                    }
                };

                if let Err(e) = scheduler.schedule(&chunk) {
                    tracing::warn!(error = %e, "failed to schedule audio chunk");
                }
            }
        }

        if message.turn_complete {
            for turn in self.transcript.complete_turn() {
                self.notify(Notice::Turn(turn));
            }
        }
    }

    /// Surface a fatal error and release everything
    fn fail(&mut self, error: Error) -> Error {
        self.set_state(SessionState::Error);
        tracing::error!(error = %error, "call failed");
        self.notify(Notice::Failure(error.to_string()));
        self.teardown();
        error
    }

    /// Release every resource the call owns; safe to call any number of times
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
        if let Some(video) = self.video.take() {
            video.close();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(cancel) = self.gate_cancel.take() {
            cancel.cancel();
        }
        self.gate.take();
        if let Some(sink) = self.sink.take() {
            self.dropped_audio_frames = sink.dropped_audio();
        }
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.close();
        }
        if let Some(session) = self.session.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { session.close().await });
            }
        }

        self.set_state(SessionState::Closed);
        tracing::debug!("call resources released");
    }

    fn summary(&mut self, end: CallEnd) -> CallSummary {
        CallSummary {
            call_id: self.id,
            end,
            turns: std::mem::take(&mut self.transcript).into_turns(),
            dropped_audio_frames: self.dropped_audio_frames,
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state changed");
        }
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine
        let _ = self.notices.send(notice);
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
