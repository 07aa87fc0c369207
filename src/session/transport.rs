//! Remote channel abstraction
//!
//! A transport opens one bidirectional live session. Inbound activity is
//! delivered in order as [`InboundEvent`]s over the channel handed to
//! [`LiveTransport::connect`]; outbound media goes through the returned
//! [`LiveSession`] handle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::config::LiveConfig;
use crate::media::MediaFrame;

/// Inline audio carried by a server message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAudio {
    /// Base64 PCM16 payload
    pub data: String,
    /// MIME descriptor, e.g. `audio/pcm;rate=24000`
    pub mime: String,
}

/// One inbound message; any combination of fields may be present
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    /// Delta of recognized user speech
    pub input_transcription: Option<String>,
    /// Delta of synthesized agent speech
    pub output_transcription: Option<String>,
    /// The current turn has finished
    pub turn_complete: bool,
    /// Audio chunks to play, in order
    pub audio: Vec<InboundAudio>,
    /// The user started talking over the agent
    pub interrupted: bool,
}

impl ServerMessage {
    /// Whether the message carries nothing actionable
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_transcription.is_none()
            && self.output_transcription.is_none()
            && !self.turn_complete
            && self.audio.is_empty()
            && !self.interrupted
    }
}

/// Events emitted by a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The remote side is ready to exchange media
    Open,
    /// Transcript, audio or control payload
    Message(ServerMessage),
    /// The remote channel failed
    Error(String),
    /// The remote channel closed
    Close {
        /// WebSocket-style close code, if known
        code: Option<u16>,
        /// Human readable reason
        reason: String,
    },
}

impl InboundEvent {
    /// Normal close code
    pub const NORMAL_CLOSE: u16 = 1000;

    /// Whether this is a close initiated normally by either side
    #[must_use]
    pub fn is_normal_close(&self) -> bool {
        matches!(
            self,
            Self::Close {
                code: None | Some(Self::NORMAL_CLOSE),
                ..
            }
        )
    }
}

/// Resolved session handle
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Send one encoded media chunk
    ///
    /// # Errors
    ///
    /// Returns error if the chunk could not be written to the channel
    async fn send_media(&self, frame: &MediaFrame) -> Result<()>;

    /// Close the session; idempotent
    async fn close(&self);
}

/// Opens live sessions with a remote agent
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect and negotiate a session
    ///
    /// # Errors
    ///
    /// Returns `Error::Channel` if the session cannot be established
    async fn connect(
        &self,
        config: &LiveConfig,
        events: mpsc::Sender<InboundEvent>,
    ) -> Result<Arc<dyn LiveSession>>;
}
