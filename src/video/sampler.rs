//! Periodic JPEG sampling of a video source into the outbound sink

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{VideoFrame, VideoSource};
use crate::media::MediaFrame;
use crate::session::OutboundSink;
use crate::{Error, Result};

/// Reusable off-screen surface for rasterizing and compressing frames
#[derive(Debug, Default)]
pub struct Surface {
    canvas: RgbImage,
    encoded: Vec<u8>,
}

impl Surface {
    /// Copy `frame` onto the surface, resizing it to the frame's native resolution
    ///
    /// # Errors
    ///
    /// Returns `Error::Video` if the pixel buffer doesn't match the dimensions
    pub fn rasterize(&mut self, frame: &VideoFrame) -> Result<()> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.rgb.len() != expected || expected == 0 {
            return Err(Error::Video(format!(
                "frame is {}x{} but carries {} bytes",
                frame.width,
                frame.height,
                frame.rgb.len()
            )));
        }

        if self.canvas.dimensions() != (frame.width, frame.height) {
            self.canvas = RgbImage::new(frame.width, frame.height);
        }
        self.canvas.copy_from_slice(&frame.rgb);
        Ok(())
    }

    /// JPEG-compress the surface at `quality` (1-100)
    ///
    /// # Errors
    ///
    /// Returns `Error::Video` if encoding fails
    pub fn compress(&mut self, quality: u8) -> Result<Vec<u8>> {
        self.encoded.clear();
        JpegEncoder::new_with_quality(&mut self.encoded, quality)
            .encode_image(&self.canvas)
            .map_err(|e| Error::Video(e.to_string()))?;
        Ok(self.encoded.clone())
    }

    /// Rasterize and compress in one step
    ///
    /// # Errors
    ///
    /// Returns `Error::Video` on a malformed frame or encoder failure
    pub fn encode(&mut self, frame: &VideoFrame, quality: u8) -> Result<Vec<u8>> {
        self.rasterize(frame)?;
        self.compress(quality)
    }
}

/// Periodically samples a video source into JPEG frames
pub struct FrameSampler {
    source: Arc<dyn VideoSource>,
    sink: OutboundSink,
    interval: Duration,
    quality: u8,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl FrameSampler {
    #[must_use]
    pub fn new(
        source: Arc<dyn VideoSource>,
        sink: OutboundSink,
        interval: Duration,
        quality: u8,
    ) -> Self {
        Self {
            source,
            sink,
            interval,
            quality: quality.clamp(1, 100),
            cancel: None,
            task: None,
        }
    }

    /// Start the sampling timer; no-op if already running
    pub fn start(&mut self) {
        if self.cancel.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let source = Arc::clone(&self.source);
        let sink = self.sink.clone();
        let period = self.interval;
        let quality = self.quality;

        let task = tokio::spawn(async move {
            let mut surface = Surface::default();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sent: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // No decoded frame yet
                        let Some(frame) = source.current_frame() else { continue };

                        let encoded = tokio::task::spawn_blocking(move || {
                            let jpeg = surface.encode(&frame, quality);
                            (surface, jpeg)
                        })
                        .await;

                        let jpeg = match encoded {
                            Ok((returned, jpeg)) => {
                                surface = returned;
                                jpeg
                            }
                            Err(e) => {
                                surface = Surface::default();
                                Err(Error::Video(e.to_string()))
                            }
                        };

                        match jpeg {
                            Ok(jpeg) => {
                                sink.send(MediaFrame::jpeg(jpeg));
                                sent += 1;
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to encode video frame"),
                        }
                    }
                }
            }

            tracing::debug!(sent, "frame sampler stopped");
        });

        tracing::debug!(
            interval_ms = period.as_millis(),
            quality,
            "frame sampler started"
        );
        self.cancel = Some(cancel);
        self.task = Some(task);
    }

    /// Stop the timer; idempotent
    ///
    /// A compression already in progress finishes but its frame is ignored
    /// once the sink is closed.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
            self.task.take();
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
