//! TOML configuration file loading
//!
//! Supports `~/.config/live-call/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LiveCallConfigFile {
    /// Remote session configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Audio capture/playback configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Video sampling configuration
    #[serde(default)]
    pub video: VideoFileConfig,
}

/// Remote session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// WebSocket endpoint of the live API
    pub endpoint: Option<String>,

    /// API key (prefer the `GEMINI_API_KEY` env var)
    pub api_key: Option<String>,

    /// Model identifier (e.g. "gemini-2.0-flash-live-001")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Zephyr")
    pub voice: Option<String>,

    /// System instruction sent with the session setup
    pub system_instruction: Option<String>,

    /// Outbound frames held while the session resolves
    pub outbound_queue: Option<usize>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Microphone sample rate in Hz
    pub input_sample_rate: Option<u32>,

    /// Playback sample rate in Hz
    pub output_sample_rate: Option<u32>,

    /// Capture block size in samples (power of two)
    pub block_size: Option<usize>,
}

/// Video configuration
#[derive(Debug, Default, Deserialize)]
pub struct VideoFileConfig {
    /// Enable video frame sampling
    pub enabled: Option<bool>,

    /// Milliseconds between sampled frames
    pub frame_interval_ms: Option<u64>,

    /// JPEG quality in `(0.0, 1.0]`
    pub jpeg_quality: Option<f32>,

    /// Still image shared as the video stream
    pub image_path: Option<PathBuf>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LiveCallConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LiveCallConfigFile {
    let Some(path) = config_file_path() else {
        return LiveCallConfigFile::default();
    };

    match load_config_file_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            LiveCallConfigFile::default()
        }
    }
}

/// Load a TOML config file from an explicit path
///
/// A missing file yields defaults.
///
/// # Errors
///
/// Returns `Error::Io` if the file can't be read or `Error::Toml` if it
/// can't be parsed
pub fn load_config_file_from(path: &Path) -> Result<LiveCallConfigFile> {
    if !path.exists() {
        return Ok(LiveCallConfigFile::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/live-call/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("live-call").join("config.toml"))
}
