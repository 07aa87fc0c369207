//! Local media device acquisition

use std::sync::Arc;

use crate::Result;
use crate::config::Config;
use crate::video::{StillImageSource, VideoSource};
use crate::voice::{AudioInput, AudioOutput, CpalInput, CpalOutput};

/// Opens the local devices a call needs
pub trait MediaDevices {
    /// Open the microphone
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if the microphone is unavailable
    fn audio_input(&self) -> Result<Box<dyn AudioInput>>;

    /// Open the speaker
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if the speaker is unavailable
    fn audio_output(&self) -> Result<Box<dyn AudioOutput>>;

    /// Open the video source, if video is enabled
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if the source is unavailable
    fn video_source(&self) -> Result<Option<Arc<dyn VideoSource>>>;
}

/// Default system devices through cpal, with an optional still image as video
#[derive(Debug, Clone)]
pub struct SystemDevices {
    config: Config,
}

impl SystemDevices {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl MediaDevices for SystemDevices {
    fn audio_input(&self) -> Result<Box<dyn AudioInput>> {
        Ok(Box::new(CpalInput::new(self.config.audio.input_sample_rate)?))
    }

    fn audio_output(&self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(CpalOutput::new(
            self.config.audio.output_sample_rate,
        )?))
    }

    fn video_source(&self) -> Result<Option<Arc<dyn VideoSource>>> {
        if !self.config.video.enabled {
            return Ok(None);
        }

        match &self.config.video.image_path {
            Some(path) => Ok(Some(Arc::new(StillImageSource::open(path)?))),
            None => {
                tracing::debug!("no video source configured, running audio-only");
                Ok(None)
            }
        }
    }
}
