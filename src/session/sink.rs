//! Outbound media sink
//!
//! Producers push frames as soon as they are attached, even while the session
//! handle is still resolving. Audio and video travel in separate bounded
//! queues: a video backlog never costs audio. The gate starts draining both
//! into the session once the handle is available, audio first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::transport::LiveSession;
use crate::media::{MediaFrame, MediaKind};

/// Default number of audio frames held while the session resolves
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Video frames held while the session resolves; newer frames are dropped
pub const VIDEO_QUEUE_CAPACITY: usize = 4;

/// Producer side of the outbound queues
///
/// Cheap to clone and safe to call from the audio callback thread.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    audio_tx: mpsc::Sender<MediaFrame>,
    video_tx: mpsc::Sender<MediaFrame>,
    dropped_audio: Arc<AtomicU64>,
    dropped_images: Arc<AtomicU64>,
}

/// Consumer side of the outbound queues, waiting for the session handle
#[derive(Debug)]
pub struct OutboundGate {
    audio_rx: mpsc::Receiver<MediaFrame>,
    video_rx: mpsc::Receiver<MediaFrame>,
    cancel: CancellationToken,
}

impl OutboundSink {
    /// Create a connected sink and gate holding up to `audio_capacity` audio
    /// frames
    #[must_use]
    pub fn channel(audio_capacity: usize) -> (Self, OutboundGate) {
        let (audio_tx, audio_rx) = mpsc::channel(audio_capacity.max(1));
        let (video_tx, video_rx) = mpsc::channel(VIDEO_QUEUE_CAPACITY);
        let sink = Self {
            audio_tx,
            video_tx,
            dropped_audio: Arc::new(AtomicU64::new(0)),
            dropped_images: Arc::new(AtomicU64::new(0)),
        };
        let gate = OutboundGate {
            audio_rx,
            video_rx,
            cancel: CancellationToken::new(),
        };
        (sink, gate)
    }

    /// Queue a frame for the session
    ///
    /// Never blocks and never fails. Image frames are dropped quietly when
    /// their queue is full; audio frames are dropped with a warning and
    /// counted.
    pub fn send(&self, frame: MediaFrame) {
        let tx = match frame.kind {
            MediaKind::Audio => &self.audio_tx,
            MediaKind::Image => &self.video_tx,
        };

        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => match frame.kind {
                MediaKind::Audio => {
                    let dropped = self.dropped_audio.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        bytes = frame.payload.len(),
                        dropped,
                        "outbound audio queue full, dropping audio frame"
                    );
                }
                MediaKind::Image => {
                    self.dropped_images.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("outbound video queue full, dropping video frame");
                }
            },
            // Session already torn down
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Audio frames lost to a full queue
    #[must_use]
    pub fn dropped_audio(&self) -> u64 {
        self.dropped_audio.load(Ordering::Relaxed)
    }

    /// Video frames lost to a full queue
    #[must_use]
    pub fn dropped_images(&self) -> u64 {
        self.dropped_images.load(Ordering::Relaxed)
    }
}

impl OutboundGate {
    /// Token that stops the forwarder between frames
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start forwarding queued and future frames to the resolved session
    ///
    /// Pending audio is always sent before pending video. The forwarder
    /// finishes when every sink clone is dropped or the gate is cancelled. A
    /// send already in flight is allowed to complete.
    pub fn attach(self, session: Arc<dyn LiveSession>) -> JoinHandle<()> {
        let Self {
            mut audio_rx,
            mut video_rx,
            cancel,
        } = self;

        tokio::spawn(async move {
            tracing::debug!(
                queued_audio = audio_rx.len(),
                queued_video = video_rx.len(),
                "outbound gate attached"
            );
            let mut audio_open = true;
            let mut video_open = true;
            let mut forwarded: u64 = 0;

            while audio_open || video_open {
                let frame = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    frame = audio_rx.recv(), if audio_open => {
                        let Some(frame) = frame else {
                            audio_open = false;
                            continue;
                        };
                        frame
                    }
                    frame = video_rx.recv(), if video_open => {
                        let Some(frame) = frame else {
                            video_open = false;
                            continue;
                        };
                        frame
                    }
                };

                if let Err(e) = session.send_media(&frame).await {
                    tracing::warn!(
                        error = %e,
                        kind = ?frame.kind,
                        "failed to send media frame"
                    );
                } else {
                    forwarded += 1;
                }
            }

            tracing::debug!(forwarded, "outbound gate closed");
        })
    }
}
