//! Audio playback to speakers
//!
//! Sources are mixed on the device thread against a sample counter, which
//! doubles as the output clock. A source starts on the exact sample frame
//! matching its scheduled start time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::{AudioOutput, FinishHook, SourceId};
use crate::media::PlaybackChunk;
use crate::{Error, Result};

/// One scheduled source on the device
struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Arc<[f32]>,
    channels: usize,
    position: usize,
    on_finish: Option<FinishHook>,
}

impl Voice {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    fn is_done(&self) -> bool {
        self.position >= self.frames()
    }

    fn sample(&self, out_channel: usize) -> f32 {
        let channel = out_channel.min(self.channels - 1);
        self.samples[self.position * self.channels + channel]
    }
}

#[derive(Default)]
struct Mixer {
    voices: Vec<Voice>,
}

impl Mixer {
    /// Fill one interleaved output buffer starting at device frame `first_frame`
    fn render(&mut self, data: &mut [f32], channels: usize, first_frame: u64) -> Vec<FinishHook> {
        for (offset, frame) in data.chunks_mut(channels).enumerate() {
            let now = first_frame + offset as u64;
            frame.fill(0.0);

            for voice in &mut self.voices {
                if voice.start_frame > now {
                    continue;
                }
                // Position tracks the device clock; a late source loses its
                // head instead of sliding into the next one
                voice.position = usize::try_from(now - voice.start_frame)
                    .map_or(usize::MAX, |elapsed| elapsed.min(voice.frames()));
                if voice.is_done() {
                    continue;
                }
                for (ch, out) in frame.iter_mut().enumerate() {
                    *out += voice.sample(ch);
                }
                voice.position += 1;
            }

            for out in frame.iter_mut() {
                *out = out.clamp(-1.0, 1.0);
            }
        }

        let mut finished = Vec::new();
        self.voices.retain_mut(|voice| {
            if voice.is_done() {
                if let Some(hook) = voice.on_finish.take() {
                    finished.push(hook);
                }
                false
            } else {
                true
            }
        });
        finished
    }
}

/// Plays scheduled sources on the default output device
pub struct CpalOutput {
    sample_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    frames_played: Arc<AtomicU64>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAcquisition` if the device cannot be opened
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceAcquisition("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceAcquisition(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| {
                Error::DeviceAcquisition("no suitable output config found".to_string())
            })?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let frames_played = Arc::new(AtomicU64::new(0));
        let channels = usize::from(config.channels);

        let mixer_clone = Arc::clone(&mixer);
        let frames_clone = Arc::clone(&frames_played);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let rendered = (data.len() / channels) as u64;
                    let finished = match mixer_clone.lock() {
                        Ok(mut mixer) => {
                            let first_frame = frames_clone.load(Ordering::Acquire);
                            let finished = mixer.render(data, channels, first_frame);
                            // Advance before unlocking so a new source never lands
                            // in frames that were already rendered
                            frames_clone.fetch_add(rendered, Ordering::Release);
                            finished
                        }
                        Err(_) => {
                            data.fill(0.0);
                            frames_clone.fetch_add(rendered, Ordering::Release);
                            Vec::new()
                        }
                    };

                    for hook in finished {
                        hook();
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::DeviceAcquisition(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceAcquisition(e.to_string()))?;

        Ok(Self {
            sample_rate,
            mixer,
            frames_played,
            stream: Some(stream),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let frames = self.frames_played.load(Ordering::Acquire) as f64;
        frames / f64::from(self.sample_rate)
    }

    fn schedule(
        &mut self,
        id: SourceId,
        chunk: &PlaybackChunk,
        start_at: f64,
        on_finish: FinishHook,
    ) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Audio("output device closed".to_string()));
        }
        if chunk.sample_rate != self.sample_rate {
            tracing::warn!(
                chunk_rate = chunk.sample_rate,
                device_rate = self.sample_rate,
                "chunk sample rate differs from device, playing at device rate"
            );
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start_frame = (start_at * f64::from(self.sample_rate)).round().max(0.0) as u64;

        let voice = Voice {
            id,
            start_frame,
            samples: Arc::clone(&chunk.samples),
            channels: usize::from(chunk.channels.max(1)),
            position: 0,
            on_finish: Some(on_finish),
        };

        self.mixer
            .lock()
            .map_err(|_| Error::Audio("playback mixer poisoned".to_string()))?
            .voices
            .push(voice);
        Ok(())
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.voices.retain(|v| v.id != id);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Ok(mut mixer) = self.mixer.lock() {
                mixer.voices.clear();
            }
            tracing::debug!("audio playback stopped");
        }
    }
}
