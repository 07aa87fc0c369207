//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::{AudioInput, SampleCallback};
use crate::codec;
use crate::session::OutboundSink;
use crate::{Error, Result};

/// Captures audio from the default input device
pub struct CpalInput {
    config: StreamConfig,
    sample_rate: u32,
    stream: Option<Stream>,
}

impl CpalInput {
    /// Open the default input device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if no suitable device is available
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceAcquisition("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceAcquisition(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == cpal::SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| {
                Error::DeviceAcquisition(format!(
                    "no mono f32 input config at {sample_rate} Hz"
                ))
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            sample_rate,
            stream: None,
        })
    }
}

impl AudioInput for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, mut on_samples: SampleCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceAcquisition("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| on_samples(data),
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::DeviceAcquisition(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceAcquisition(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

/// Slices an arbitrary stream of device samples into fixed-size blocks
#[derive(Debug)]
pub struct BlockFramer {
    block: Vec<f32>,
    block_size: usize,
}

impl BlockFramer {
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block: Vec::with_capacity(block_size),
            block_size,
        }
    }

    /// Append samples, calling `emit` once per completed block
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let take = (self.block_size - self.block.len()).min(samples.len());
            self.block.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.block.len() == self.block_size {
                emit(&self.block);
                self.block.clear();
            }
        }
    }

    /// Samples waiting for the current block to fill
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.block.len()
    }
}

/// Streams microphone blocks to the outbound sink
///
/// Every block delivered by the device clock is encoded and queued without
/// blocking the audio callback.
pub struct CapturePipeline {
    input: Box<dyn AudioInput>,
    sink: OutboundSink,
    block_size: usize,
    running: bool,
}

impl CapturePipeline {
    #[must_use]
    pub fn new(input: Box<dyn AudioInput>, sink: OutboundSink, block_size: usize) -> Self {
        Self {
            input,
            sink,
            block_size,
            running: false,
        }
    }

    /// Attach the block processor and start the device
    ///
    /// # Errors
    ///
    /// Returns error if the input device cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }

        let sample_rate = self.input.sample_rate();
        let sink = self.sink.clone();
        let mut framer = BlockFramer::new(self.block_size);

        self.input.open(Box::new(move |samples: &[f32]| {
            framer.push(samples, |block| {
                sink.send(codec::encode_audio_frame(block, sample_rate));
            });
        }))?;
        self.running = true;

        tracing::debug!(
            block_size = self.block_size,
            sample_rate,
            "capture pipeline started"
        );
        Ok(())
    }

    /// Detach the processor and release the device; idempotent
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.input.close();
        tracing::debug!("capture pipeline stopped");
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
