// SPDX-License-Identifier: GPL-3.0-only

//! Audio playback through the platform output callback
//!
//! Samples are queued into a circular buffer that the cpal callback drains on
//! a thread we do not own. When the writer laps the reader the oldest samples
//! are dropped; when the reader runs dry it plays silence.

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use tracing::{debug, error, info, warn};

use crate::constants::audio::{OUTPUT_BUFFER_FRAMES, PLAYBACK_BUFFER_SECONDS};
use crate::errors::AudioError;

/// Circular i16 sample buffer with playback volume
#[derive(Debug)]
pub struct PlaybackBuffer {
    samples: Vec<i16>,
    read: usize,
    len: usize,
    volume: f32,
}

impl PlaybackBuffer {
    /// Buffer holding `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity.max(1)],
            read: 0,
            len: 0,
            volume: 1.0,
        }
    }

    /// Two seconds of audio at the given format
    pub fn for_format(sample_rate: u32, channels: u32) -> Self {
        Self::new(sample_rate as usize * channels as usize * PLAYBACK_BUFFER_SECONDS)
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples waiting to be played
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append samples, overwriting the oldest ones when full
    pub fn push(&mut self, input: &[i16]) {
        let capacity = self.samples.len();
        for &sample in input {
            let write = (self.read + self.len) % capacity;
            self.samples[write] = sample;
            if self.len == capacity {
                self.read = (self.read + 1) % capacity;
            } else {
                self.len += 1;
            }
        }
    }

    /// Next volume-scaled sample, or silence when empty
    pub fn next_sample(&mut self) -> i16 {
        if self.len == 0 {
            return 0;
        }
        let raw = self.samples[self.read];
        self.read = (self.read + 1) % self.samples.len();
        self.len -= 1;

        let scaled = (raw as f32 * self.volume) as i32;
        scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// Fill an output block, padding with silence
    pub fn fill(&mut self, out: &mut [i16]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }

    /// Set volume, clamped to [0, 1]; NaN mutes
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Drop every queued sample
    pub fn clear(&mut self) {
        self.read = 0;
        self.len = 0;
    }
}

/// Cloneable, `Send` handle for feeding a playback sink from another thread
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    buffer: Arc<Mutex<PlaybackBuffer>>,
    channels: u32,
}

impl PlaybackHandle {
    /// Queue `frame_count` interleaved frames from `samples`
    ///
    /// Extra samples beyond `frame_count * channels` are ignored.
    pub fn queue_audio(&self, samples: &[i16], frame_count: usize) {
        let count = (frame_count * self.channels as usize).min(samples.len());
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(&samples[..count]);
    }

    pub fn set_volume(&self, volume: f32) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .volume()
    }

    /// Samples queued but not yet played
    pub fn queued(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Audio playback sink
///
/// The output stream is opened by [`start`](Self::start) on the default
/// output device. `cpal::Stream` is not `Send`, so the sink stays on the
/// thread that created it; use [`handle`](Self::handle) to queue audio from
/// elsewhere.
pub struct AudioPlayback {
    sample_rate: u32,
    channels: u32,
    handle: PlaybackHandle,
    stream: Option<cpal::Stream>,
    running: bool,
}

impl AudioPlayback {
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate,
            channels,
            handle: PlaybackHandle {
                buffer: Arc::new(Mutex::new(PlaybackBuffer::for_format(sample_rate, channels))),
                channels,
            },
            stream: None,
            running: false,
        }
    }

    /// Open the output stream (first call only) and start pulling samples
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running {
            return Ok(());
        }

        if self.stream.is_none() {
            self.stream = Some(self.build_stream()?);
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| AudioError::Stream(e.to_string()))?;
        }

        self.running = true;
        info!(
            sample_rate = self.sample_rate,
            channels = self.channels,
            "Audio playback started"
        );
        Ok(())
    }

    /// Pause the output stream and drop queued audio; idempotent
    ///
    /// A later `start` begins with silence rather than stale samples.
    pub fn stop(&mut self) {
        self.handle
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(stream) = &self.stream
            && let Err(e) = stream.pause()
        {
            // Not every host can pause; the stream is dropped instead
            debug!(error = %e, "Pausing output stream failed, closing it");
            self.stream = None;
        }
        info!("Audio playback stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Queue `frame_count` interleaved frames for playback
    pub fn queue_audio(&self, samples: &[i16], frame_count: usize) {
        self.handle.queue_audio(samples, frame_count);
    }

    pub fn set_volume(&self, volume: f32) {
        self.handle.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.handle.volume()
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    fn build_stream(&self) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let sample_format = device
            .default_output_config()
            .map(|c| c.sample_format())
            .unwrap_or(SampleFormat::I16);

        let channels = u16::try_from(self.channels)
            .map_err(|_| AudioError::Negotiation(format!("{} channels", self.channels)))?;
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(OUTPUT_BUFFER_FRAMES),
        };

        debug!(
            device = %device.name().unwrap_or_default(),
            ?sample_format,
            sample_rate = self.sample_rate,
            channels,
            "Building output stream"
        );

        let buffer = Arc::clone(&self.handle.buffer);
        match sample_format {
            SampleFormat::I16 => build_typed_stream::<i16>(&device, &config, buffer),
            SampleFormat::I32 => build_typed_stream::<i32>(&device, &config, buffer),
            SampleFormat::U16 => build_typed_stream::<u16>(&device, &config, buffer),
            SampleFormat::F32 => build_typed_stream::<f32>(&device, &config, buffer),
            SampleFormat::F64 => build_typed_stream::<f64>(&device, &config, buffer),
            other => {
                warn!(format = ?other, "Unusual output sample format, requesting f32");
                build_typed_stream::<f32>(&device, &config, buffer)
            }
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<PlaybackBuffer>>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                for sample in data.iter_mut() {
                    *sample = T::from_sample(buffer.next_sample());
                }
            },
            |err| error!(error = %err, "Audio output stream error"),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}
