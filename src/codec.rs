//! Wire codec for live session media
//!
//! Converts between float sample buffers and the transport's PCM16
//! little-endian representation, wrapped in standard base64 for the
//! text envelope.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::media::{MediaFrame, PlaybackChunk};
use crate::{Error, Result};

/// Full-scale value used for fixed-point conversion
const PCM16_SCALE: f32 = 32768.0;

/// Encode float samples in `[-1.0, 1.0]` as PCM16 little-endian bytes
///
/// Samples are clamped, scaled by 32768 and truncated toward zero, with the
/// positive full scale saturating at `i16::MAX`.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // NaN clamps to NaN and `as` maps it to zero
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode PCM16 little-endian bytes into interleaved float samples
///
/// # Errors
///
/// Returns `Error::MalformedFrame` if the byte length is not a whole number
/// of sample frames for `channels`
pub fn decode_pcm16(bytes: &[u8], channels: u16) -> Result<Vec<f32>> {
    let frame_bytes = usize::from(channels.max(1)) * 2;
    if bytes.len() % frame_bytes != 0 {
        return Err(Error::MalformedFrame(format!(
            "{} bytes is not a multiple of {frame_bytes} ({channels} channel PCM16)",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM16_SCALE)
        .collect())
}

/// Encode bytes as standard padded base64
#[must_use]
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard padded base64
///
/// # Errors
///
/// Returns `Error::MalformedFrame` if the input is not valid base64
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| Error::MalformedFrame(format!("invalid base64: {e}")))
}

/// Encode one captured block as an outbound audio frame
#[must_use]
pub fn encode_audio_frame(samples: &[f32], sample_rate: u32) -> MediaFrame {
    MediaFrame::audio(encode_pcm16(samples), sample_rate)
}

/// Decode an inbound base64 PCM16 payload into a playback chunk
///
/// # Errors
///
/// Returns `Error::MalformedFrame` on invalid base64 or a truncated frame
pub fn decode_audio_chunk(data: &str, sample_rate: u32, channels: u16) -> Result<PlaybackChunk> {
    let bytes = from_base64(data)?;
    let samples = decode_pcm16(&bytes, channels)?;
    Ok(PlaybackChunk::new(samples, channels, sample_rate))
}

/// Read the `rate=` parameter of a PCM mime type such as `audio/pcm;rate=24000`
#[must_use]
pub fn parse_pcm_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}
