//! Live session lifecycle
//!
//! - [`CallSession`]: per-call state machine owning every device and producer
//! - [`OutboundSink`]: deferred outbound media queue
//! - [`LiveTransport`]: remote channel abstraction, with [`GeminiLiveTransport`]

mod gemini;
mod machine;
mod sink;
mod transport;

pub use gemini::{GeminiLiveSession, GeminiLiveTransport, endpoint_url, parse_server_frame};
pub use machine::{CallEnd, CallSession, CallSummary, Notice, SessionState};
pub use sink::{DEFAULT_QUEUE_CAPACITY, OutboundGate, OutboundSink, VIDEO_QUEUE_CAPACITY};
pub use transport::{InboundAudio, InboundEvent, LiveSession, LiveTransport, ServerMessage};
