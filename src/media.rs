//! Media and transcript data model shared by the call pipeline

use std::fmt;
use std::sync::Arc;

/// Kind of outbound media frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// PCM16 audio block
    Audio,
    /// Compressed still image from the camera
    Image,
}

/// An encoded media chunk ready for the remote channel
///
/// Produced once by a capture producer and consumed once by the outbound sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Which stream the frame belongs to
    pub kind: MediaKind,
    /// Encoded payload bytes
    pub payload: Vec<u8>,
    /// MIME descriptor, e.g. `audio/pcm;rate=16000`
    pub mime: String,
}

impl MediaFrame {
    /// Create an audio frame
    #[must_use]
    pub fn audio(payload: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            kind: MediaKind::Audio,
            payload,
            mime: format!("audio/pcm;rate={sample_rate}"),
        }
    }

    /// Create a JPEG image frame
    #[must_use]
    pub fn jpeg(payload: Vec<u8>) -> Self {
        Self {
            kind: MediaKind::Image,
            payload,
            mime: "image/jpeg".to_string(),
        }
    }
}

/// Who produced a piece of transcript text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    /// Recognized speech of the local user
    User,
    /// Synthesized speech of the remote agent
    Model,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Incremental piece of transcript text for an in-progress turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

impl TranscriptFragment {
    /// Create a non-final fragment
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            is_final: false,
        }
    }
}

/// One finalized utterance attributed to a single speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Decoded inbound audio ready for scheduling
///
/// Samples are interleaved when `channels > 1`
#[derive(Debug, Clone)]
pub struct PlaybackChunk {
    pub samples: Arc<[f32]>,
    pub channels: u16,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

impl PlaybackChunk {
    /// Build a chunk from interleaved samples, deriving its duration
    #[must_use]
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        #[allow(clippy::cast_precision_loss)]
        let frames = (samples.len() / usize::from(channels)) as f64;
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            frames / f64::from(sample_rate)
        };

        Self {
            samples: samples.into(),
            channels,
            sample_rate,
            duration_secs,
        }
    }

    /// Number of sample frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }
}
