//! Video frame sampling
//!
//! A fixed-period timer samples the video source, compresses the current
//! frame to JPEG and forwards it to the outbound sink.

mod sampler;

use std::path::Path;
use std::sync::Arc;

pub use sampler::{FrameSampler, Surface};

use crate::{Error, Result};

/// A decoded video frame in packed RGB8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Local video device yielding frames on demand
pub trait VideoSource: Send + Sync {
    /// Latest decoded frame, or `None` if nothing has been decoded yet
    fn current_frame(&self) -> Option<Arc<VideoFrame>>;

    /// Release the device
    fn close(&self) {}
}

/// Shares a single still image as the video stream
#[derive(Debug)]
pub struct StillImageSource {
    frame: Arc<VideoFrame>,
}

impl StillImageSource {
    /// Load and decode an image file
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if the file cannot be read or decoded
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|e| Error::DeviceAcquisition(format!("{}: {e}", path.display())))?
            .into_rgb8();

        tracing::debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "still image source opened"
        );

        Ok(Self {
            frame: Arc::new(VideoFrame {
                width: image.width(),
                height: image.height(),
                rgb: image.into_raw(),
            }),
        })
    }
}

impl VideoSource for StillImageSource {
    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        Some(Arc::clone(&self.frame))
    }
}
