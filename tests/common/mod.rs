//! Shared test utilities
//!
//! In-memory devices and transport so the call pipeline runs without audio
//! hardware or network access.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use live_call::codec;
use live_call::config::LiveConfig;
use live_call::media::{MediaFrame, PlaybackChunk};
use live_call::session::{InboundAudio, InboundEvent, LiveSession, LiveTransport, ServerMessage};
use live_call::video::{VideoFrame, VideoSource};
use live_call::voice::{AudioInput, AudioOutput, FinishHook, SampleCallback, SourceId};
use live_call::{Config, Error, MediaDevices, Result};

/// A source handed to the fake output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start_at: f64,
    pub duration: f64,
}

/// Shared view into the fake devices
#[derive(Clone, Default)]
pub struct Monitor {
    pub input_closes: Arc<AtomicUsize>,
    pub output_closes: Arc<AtomicUsize>,
    pub video_closes: Arc<AtomicUsize>,
    pub video_polls: Arc<AtomicUsize>,
    mic: Arc<Mutex<Option<SampleCallback>>>,
    clock: Arc<Mutex<f64>>,
    scheduled: Arc<Mutex<Vec<ScheduledSource>>>,
    stopped: Arc<Mutex<Vec<SourceId>>>,
    hooks: Arc<Mutex<HashMap<SourceId, FinishHook>>>,
}

impl Monitor {
    /// Deliver samples as if the microphone clock fired; false if not open
    pub fn feed_mic(&self, samples: &[f32]) -> bool {
        let mut mic = self.mic.lock().unwrap();
        match mic.as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }

    pub fn mic_open(&self) -> bool {
        self.mic.lock().unwrap().is_some()
    }

    pub fn set_clock(&self, seconds: f64) {
        *self.clock.lock().unwrap() = seconds;
    }

    pub fn scheduled(&self) -> Vec<ScheduledSource> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Play a source out to the end, running its finish hook
    pub fn finish(&self, id: SourceId) {
        let hook = self.hooks.lock().unwrap().remove(&id);
        if let Some(hook) = hook {
            hook();
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Microphone fed by [`Monitor::feed_mic`]
pub struct FakeInput {
    monitor: Monitor,
    sample_rate: u32,
}

impl FakeInput {
    pub fn new(monitor: &Monitor, sample_rate: u32) -> Self {
        Self {
            monitor: monitor.clone(),
            sample_rate,
        }
    }
}

impl AudioInput for FakeInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, on_samples: SampleCallback) -> Result<()> {
        *self.monitor.mic.lock().unwrap() = Some(on_samples);
        Ok(())
    }

    fn close(&mut self) {
        self.monitor.mic.lock().unwrap().take();
        self.monitor.input_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Speaker with a manually driven clock
pub struct FakeOutput {
    monitor: Monitor,
    closed: bool,
}

impl FakeOutput {
    pub fn new(monitor: &Monitor) -> Self {
        Self {
            monitor: monitor.clone(),
            closed: false,
        }
    }
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.monitor.clock.lock().unwrap()
    }

    fn schedule(
        &mut self,
        id: SourceId,
        chunk: &PlaybackChunk,
        start_at: f64,
        on_finish: FinishHook,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::Audio("output closed".to_string()));
        }
        self.monitor.scheduled.lock().unwrap().push(ScheduledSource {
            id,
            start_at,
            duration: chunk.duration_secs,
        });
        self.monitor.hooks.lock().unwrap().insert(id, on_finish);
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        self.monitor.hooks.lock().unwrap().remove(&id);
        self.monitor.stopped.lock().unwrap().push(id);
    }

    fn close(&mut self) {
        self.closed = true;
        self.monitor.output_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Camera with a small gray frame, optionally blank for its first few polls
pub struct FakeVideo {
    monitor: Monitor,
    blank_polls: AtomicUsize,
    frame: Arc<VideoFrame>,
}

impl FakeVideo {
    pub fn new(monitor: &Monitor, blank_polls: usize) -> Self {
        Self {
            monitor: monitor.clone(),
            blank_polls: AtomicUsize::new(blank_polls),
            frame: Arc::new(VideoFrame {
                width: 8,
                height: 8,
                rgb: vec![128; 8 * 8 * 3],
            }),
        }
    }
}

impl VideoSource for FakeVideo {
    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.monitor.video_polls.fetch_add(1, Ordering::SeqCst);
        let blank = self
            .blank_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if blank {
            return None;
        }
        Some(Arc::clone(&self.frame))
    }

    fn close(&self) {
        self.monitor.video_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Device set backed by the fakes above
#[derive(Clone, Default)]
pub struct FakeDevices {
    monitor: Monitor,
    deny_microphone: bool,
    video: Option<usize>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Microphone permission is refused
    pub fn denying_microphone() -> Self {
        Self {
            deny_microphone: true,
            ..Self::default()
        }
    }

    pub fn with_video(self) -> Self {
        self.with_late_video(0)
    }

    /// Camera that has no decoded frame for its first `blank_polls` polls
    pub fn with_late_video(mut self, blank_polls: usize) -> Self {
        self.video = Some(blank_polls);
        self
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor.clone()
    }
}

impl MediaDevices for FakeDevices {
    fn audio_input(&self) -> Result<Box<dyn AudioInput>> {
        if self.deny_microphone {
            return Err(Error::DeviceAcquisition(
                "microphone permission denied".to_string(),
            ));
        }
        Ok(Box::new(FakeInput::new(&self.monitor, 16000)))
    }

    fn audio_output(&self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(FakeOutput::new(&self.monitor)))
    }

    fn video_source(&self) -> Result<Option<Arc<dyn VideoSource>>> {
        Ok(self.video.map(|blank_polls| {
            Arc::new(FakeVideo::new(&self.monitor, blank_polls)) as Arc<dyn VideoSource>
        }))
    }
}

/// Session that records every frame sent through it
#[derive(Clone, Default)]
pub struct FakeSession {
    pub sent: Arc<Mutex<Vec<MediaFrame>>>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn sent(&self) -> Vec<MediaFrame> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiveSession for FakeSession {
    async fn send_media(&self, frame: &MediaFrame) -> Result<()> {
        self.sent.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport whose remote side is driven by a [`FakeRemote`]
pub struct FakeTransport {
    connected: mpsc::UnboundedSender<mpsc::Sender<InboundEvent>>,
    session: FakeSession,
    release: Option<Arc<Notify>>,
    refuse: bool,
}

/// Test handle for the remote end of a [`FakeTransport`]
pub struct FakeRemote {
    connected: mpsc::UnboundedReceiver<mpsc::Sender<InboundEvent>>,
    pub session: FakeSession,
}

impl FakeTransport {
    pub fn new() -> (Self, FakeRemote) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = FakeSession::default();
        let transport = Self {
            connected: tx,
            session: session.clone(),
            release: None,
            refuse: false,
        };
        let remote = FakeRemote {
            connected: rx,
            session,
        };
        (transport, remote)
    }

    /// Hold `connect` until `release` is notified
    pub fn gated(mut self, release: Arc<Notify>) -> Self {
        self.release = Some(release);
        self
    }

    /// Fail every connection attempt
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(
        &self,
        _config: &LiveConfig,
        events: mpsc::Sender<InboundEvent>,
    ) -> Result<Arc<dyn LiveSession>> {
        if let Some(release) = &self.release {
            release.notified().await;
        }
        if self.refuse {
            return Err(Error::Channel("connection refused".to_string()));
        }
        let _ = self.connected.send(events);
        Ok(Arc::new(self.session.clone()))
    }
}

impl FakeRemote {
    /// Wait for the call to connect and return its inbound event sender
    pub async fn connected(&mut self) -> mpsc::Sender<InboundEvent> {
        self.connected
            .recv()
            .await
            .expect("transport dropped before connecting")
    }

    pub fn was_connected(&mut self) -> bool {
        self.connected.try_recv().is_ok()
    }
}

/// Config tuned for tests: tiny capture blocks, audio only
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.audio.block_size = 4;
    config.video.enabled = false;
    config.video.frame_interval = Duration::from_millis(10);
    config
}

pub fn user_says(text: &str) -> InboundEvent {
    InboundEvent::Message(ServerMessage {
        input_transcription: Some(text.to_string()),
        ..Default::default()
    })
}

pub fn model_says(text: &str) -> InboundEvent {
    InboundEvent::Message(ServerMessage {
        output_transcription: Some(text.to_string()),
        ..Default::default()
    })
}

pub fn turn_complete() -> InboundEvent {
    InboundEvent::Message(ServerMessage {
        turn_complete: true,
        ..Default::default()
    })
}

pub fn interrupted() -> InboundEvent {
    InboundEvent::Message(ServerMessage {
        interrupted: true,
        ..Default::default()
    })
}

/// Inbound audio message carrying `samples` as 24 kHz PCM16
pub fn model_audio(samples: &[f32]) -> InboundEvent {
    raw_audio(&codec::to_base64(&codec::encode_pcm16(samples)))
}

/// Inbound audio message with an arbitrary payload
pub fn raw_audio(data: &str) -> InboundEvent {
    InboundEvent::Message(ServerMessage {
        audio: vec![InboundAudio {
            data: data.to_string(),
            mime: "audio/pcm;rate=24000".to_string(),
        }],
        ..Default::default()
    })
}

pub fn normal_close() -> InboundEvent {
    InboundEvent::Close {
        code: Some(InboundEvent::NORMAL_CLOSE),
        reason: String::new(),
    }
}

/// Tracing layer counting warnings and errors
#[derive(Clone, Default)]
pub struct WarnCounter(pub Arc<AtomicUsize>);

impl WarnCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() <= Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Poll `check` until it holds or about a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
