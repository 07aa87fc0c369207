//! Configuration management for live calls
//!
//! Values are layered env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};
use file::LiveCallConfigFile;

/// Default live API WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default live model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-live-001";

/// Microphone sample rate expected by the remote endpoint
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of synthesized speech
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Capture block size (~256 ms at 16 kHz)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Video sampling period (~15 frames/second)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(66);

/// Lossy image quality for sampled frames
pub const DEFAULT_JPEG_QUALITY: f32 = 0.8;

/// Live call configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Remote session configuration
    pub live: LiveConfig,

    /// Audio configuration
    pub audio: AudioConfig,

    /// Video configuration
    pub video: VideoConfig,
}

/// Remote session configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint
    pub endpoint: String,

    /// API key, sent as the `key` query parameter
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice: Option<String>,

    /// System instruction for the agent
    pub system_instruction: Option<String>,

    /// Outbound frames held while the session resolves
    pub outbound_queue: usize,
}

/// Audio capture/playback configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Microphone sample rate in Hz
    pub input_sample_rate: u32,

    /// Playback sample rate in Hz
    pub output_sample_rate: u32,

    /// Channel count of inbound audio
    pub output_channels: u16,

    /// Capture block size in samples
    pub block_size: usize,
}

/// Video sampling configuration
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// Enable video frame sampling
    pub enabled: bool,

    /// Time between sampled frames
    pub frame_interval: Duration,

    /// JPEG quality in `(0.0, 1.0]`
    pub jpeg_quality: f32,

    /// Still image shared as the video stream
    pub image_path: Option<PathBuf>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: None,
            system_instruction: None,
            outbound_queue: crate::session::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            output_channels: 1,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            image_path: None,
        }
    }
}

impl VideoConfig {
    /// JPEG quality on the encoder's 1-100 scale
    #[must_use]
    pub fn jpeg_quality_percent(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (self.jpeg_quality * 100.0).round().clamp(1.0, 100.0) as u8;
        percent
    }
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn from_sources(
        fc: LiveCallConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("GOOGLE_API_KEY"))
            .or(fc.live.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let live = LiveConfig {
            endpoint: env("LIVE_CALL_ENDPOINT")
                .or(fc.live.endpoint)
                .unwrap_or(defaults.live.endpoint),
            api_key,
            model: env("LIVE_CALL_MODEL")
                .or(fc.live.model)
                .unwrap_or(defaults.live.model),
            voice: env("LIVE_CALL_VOICE").or(fc.live.voice),
            system_instruction: fc.live.system_instruction,
            outbound_queue: fc
                .live
                .outbound_queue
                .unwrap_or(defaults.live.outbound_queue),
        };

        let audio = AudioConfig {
            input_sample_rate: fc
                .audio
                .input_sample_rate
                .unwrap_or(defaults.audio.input_sample_rate),
            output_sample_rate: fc
                .audio
                .output_sample_rate
                .unwrap_or(defaults.audio.output_sample_rate),
            output_channels: defaults.audio.output_channels,
            block_size: fc.audio.block_size.unwrap_or(defaults.audio.block_size),
        };

        let video = VideoConfig {
            enabled: fc.video.enabled.unwrap_or(defaults.video.enabled),
            frame_interval: fc
                .video
                .frame_interval_ms
                .map_or(defaults.video.frame_interval, Duration::from_millis),
            jpeg_quality: fc.video.jpeg_quality.unwrap_or(defaults.video.jpeg_quality),
            image_path: fc.video.image_path,
        };

        let config = Self { live, audio, video };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !self.audio.block_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "audio.block_size must be a power of two, got {}",
                self.audio.block_size
            )));
        }
        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }
        if self.video.frame_interval.is_zero() {
            return Err(Error::Config(
                "video.frame_interval_ms must be non-zero".to_string(),
            ));
        }
        if !(self.video.jpeg_quality > 0.0 && self.video.jpeg_quality <= 1.0) {
            return Err(Error::Config(format!(
                "video.jpeg_quality must be in (0, 1], got {}",
                self.video.jpeg_quality
            )));
        }
        if self.live.outbound_queue == 0 {
            return Err(Error::Config(
                "live.outbound_queue must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
