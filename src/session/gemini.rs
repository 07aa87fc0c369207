//! Gemini Live transport over WebSocket
//!
//! Speaks the `BidiGenerateContent` protocol: a `setup` message opens the
//! session, `realtimeInput` carries base64 media, and the server replies with
//! `setupComplete` followed by `serverContent` messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::transport::{InboundAudio, InboundEvent, LiveSession, LiveTransport, ServerMessage};
use crate::codec;
use crate::config::LiveConfig;
use crate::media::{MediaFrame, MediaKind};
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens Gemini Live sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiLiveTransport;

#[async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn connect(
        &self,
        config: &LiveConfig,
        events: mpsc::Sender<InboundEvent>,
    ) -> Result<Arc<dyn LiveSession>> {
        let url = endpoint_url(config)?;

        tracing::debug!(
            host = url.host_str().unwrap_or_default(),
            model = %config.model,
            "connecting live session"
        );

        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Channel(format!("connect failed: {e}")))?;
        let (mut writer, reader) = ws.split();

        let setup = serde_json::to_string(&SetupFrame::from_config(config))?;
        writer
            .send(Message::Text(setup.into()))
            .await
            .map_err(|e| Error::Channel(format!("setup failed: {e}")))?;

        tokio::spawn(read_loop(reader, events));

        Ok(Arc::new(GeminiLiveSession {
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A resolved Gemini Live session
pub struct GeminiLiveSession {
    writer: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
}

#[async_trait]
impl LiveSession for GeminiLiveSession {
    async fn send_media(&self, frame: &MediaFrame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let text = serde_json::to_string(&RealtimeInputFrame::from_media(frame))?;
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "close frame not sent");
        }
        let _ = writer.close().await;
        tracing::debug!("live session closed");
    }
}

/// Forward inbound frames as events until the socket ends
async fn read_loop(mut reader: SplitStream<WsStream>, events: mpsc::Sender<InboundEvent>) {
    while let Some(message) = reader.next().await {
        let parsed = match message {
            Ok(Message::Text(text)) => parse_server_frame(text.as_bytes()),
            Ok(Message::Binary(bytes)) => parse_server_frame(&bytes),
            Ok(Message::Close(frame)) => {
                let (code, reason) = frame.map_or((None, String::new()), |f| {
                    (Some(u16::from(f.code)), f.reason.as_str().to_string())
                });
                let _ = events.send(InboundEvent::Close { code, reason }).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = events.send(InboundEvent::Error(e.to_string())).await;
                return;
            }
        };

        match parsed {
            Ok(Some(event)) => {
                if events.send(event).await.is_err() {
                    // Dispatch loop has gone away
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unparsable server frame"),
        }
    }

    let _ = events
        .send(InboundEvent::Close {
            code: None,
            reason: "stream ended".to_string(),
        })
        .await;
}

/// Build the endpoint URL with the API key as a query parameter
///
/// # Errors
///
/// Returns `Error::Config` if the endpoint is not a valid URL
pub fn endpoint_url(config: &LiveConfig) -> Result<url::Url> {
    let mut url = url::Url::parse(&config.endpoint)
        .map_err(|e| Error::Config(format!("invalid endpoint {}: {e}", config.endpoint)))?;
    if let Some(key) = &config.api_key {
        url.query_pairs_mut().append_pair("key", key.expose_secret());
    }
    Ok(url)
}

/// Translate one server frame into an inbound event
///
/// # Errors
///
/// Returns error if the frame is not valid JSON
pub fn parse_server_frame(bytes: &[u8]) -> Result<Option<InboundEvent>> {
    let frame: ServerFrame = serde_json::from_slice(bytes)?;

    if frame.setup_complete.is_some() {
        return Ok(Some(InboundEvent::Open));
    }

    if let Some(go_away) = frame.go_away {
        tracing::warn!(time_left = ?go_away.time_left, "server is about to close the session");
    }

    let Some(content) = frame.server_content else {
        return Ok(None);
    };

    let audio = content
        .model_turn
        .map(|turn| {
            turn.parts
                .into_iter()
                .filter_map(|part| part.inline_data)
                .filter(|data| data.mime_type.starts_with("audio/"))
                .map(|data| InboundAudio {
                    data: data.data,
                    mime: data.mime_type,
                })
                .collect()
        })
        .unwrap_or_default();

    let message = ServerMessage {
        input_transcription: content.input_transcription.map(|t| t.text),
        output_transcription: content.output_transcription.map(|t| t.text),
        turn_complete: content.turn_complete,
        audio,
        interrupted: content.interrupted,
    };

    Ok((!message.is_empty()).then_some(InboundEvent::Message(message)))
}

// Outbound wire types

#[derive(Debug, Serialize)]
struct SetupFrame {
    setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct Empty {}

impl SetupFrame {
    fn from_config(config: &LiveConfig) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO"],
                    speech_config: config.voice.as_ref().map(|name| SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: name.clone(),
                            },
                        },
                    }),
                },
                system_instruction: config.system_instruction.as_ref().map(|text| Content {
                    parts: vec![TextPart { text: text.clone() }],
                }),
                input_audio_transcription: Empty {},
                output_audio_transcription: Empty {},
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputFrame {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Default, Serialize)]
struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<Blob>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

impl RealtimeInputFrame {
    fn from_media(frame: &MediaFrame) -> Self {
        let blob = Blob {
            mime_type: frame.mime.clone(),
            data: codec::to_base64(&frame.payload),
        };
        let realtime_input = match frame.kind {
            MediaKind::Audio => RealtimeInput {
                audio: Some(blob),
                ..Default::default()
            },
            MediaKind::Image => RealtimeInput {
                video: Some(blob),
                ..Default::default()
            },
        };
        Self { realtime_input }
    }
}

// Inbound wire types

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerFrame {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<InboundPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundPart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    time_left: Option<String>,
}
