//! Voice processing module
//!
//! Handles microphone capture, scheduled playback of inbound speech, and the
//! device abstractions both sit on.

mod capture;
mod playback;
mod scheduler;

pub use capture::{BlockFramer, CapturePipeline, CpalInput};
pub use playback::CpalOutput;
pub use scheduler::PlaybackScheduler;

use crate::Result;
use crate::media::PlaybackChunk;

/// Identifier of a scheduled playback source
pub type SourceId = u64;

/// Callback receiving raw device samples
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Hook run when a scheduled source finishes playing naturally
pub type FinishHook = Box<dyn FnOnce() + Send + 'static>;

/// Local audio capture device
pub trait AudioInput {
    /// Sample rate of delivered samples in Hz
    fn sample_rate(&self) -> u32;

    /// Start delivering mono samples to `on_samples` from the device clock
    ///
    /// # Errors
    ///
    /// Returns error if the device stream cannot be started
    fn open(&mut self, on_samples: SampleCallback) -> Result<()>;

    /// Stop delivery and release the device
    fn close(&mut self);
}

/// Local audio output device with a readable monotonic clock
pub trait AudioOutput {
    /// Device clock in seconds
    fn current_time(&self) -> f64;

    /// Schedule `chunk` to start at device time `start_at`
    ///
    /// `on_finish` runs once the source plays out; it is not run for a
    /// source cancelled with [`AudioOutput::stop`].
    ///
    /// # Errors
    ///
    /// Returns error if the device can no longer accept sources
    fn schedule(
        &mut self,
        id: SourceId,
        chunk: &PlaybackChunk,
        start_at: f64,
        on_finish: FinishHook,
    ) -> Result<()>;

    /// Cancel a scheduled or playing source
    fn stop(&mut self, id: SourceId);

    /// Release the output device
    fn close(&mut self);
}
