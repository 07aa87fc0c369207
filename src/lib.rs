//! Live Call - real-time audio/video conversations with a remote agent
//!
//! This library provides the building blocks of a live call:
//! - Microphone capture framed into PCM16 audio frames
//! - Periodic video frame sampling into JPEG frames
//! - A deferred outbound queue that holds media until the session resolves
//! - Gapless playback of inbound speech with barge-in support
//! - Transcript accumulation into turns
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ Microphone   │   │ Video source │
//! └──────┬───────┘   └──────┬───────┘
//!        │ PCM16            │ JPEG
//! ┌──────▼──────────────────▼───────┐
//! │          Outbound sink          │
//! └────────────────┬────────────────┘
//!                  │
//! ┌────────────────▼────────────────┐
//! │       Live transport (WS)       │
//! └────────────────┬────────────────┘
//!                  │ inbound events
//! ┌────────────────▼────────────────┐
//! │     Call session dispatch       │
//! │  Playback  │  Transcript        │
//! └─────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod devices;
pub mod error;
pub mod media;
pub mod session;
pub mod transcript;
pub mod video;
pub mod voice;

pub use config::Config;
pub use devices::{MediaDevices, SystemDevices};
pub use error::{Error, Result};
pub use session::{CallEnd, CallSession, CallSummary, GeminiLiveTransport, Notice, SessionState};
