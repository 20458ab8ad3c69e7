// SPDX-License-Identifier: GPL-3.0-only

//! Capture-to-playback audio passthrough
//!
//! A pump thread moves each published capture period into the playback
//! ring. The playback sink itself stays on the thread that built it.

use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use super::capture::{AudioCapture, DoubleBuffer};
use super::playback::{AudioPlayback, PlaybackHandle};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::constants::viewer::AUDIO_PUMP_INTERVAL;
use crate::errors::AudioError;

/// Move one pending period from `source` to `sink`
///
/// Returns false when nothing new was published.
pub fn pump_once(source: &DoubleBuffer, sink: &PlaybackHandle) -> bool {
    match source.take() {
        Some(frame) => {
            sink.queue_audio(&frame.samples, frame.frame_count);
            true
        }
        None => false,
    }
}

/// Live audio monitor: capture, pump, playback
pub struct AudioPassthrough {
    capture: AudioCapture,
    playback: Option<AudioPlayback>,
    pump: Option<CaptureLoopController>,
    volume: f32,
}

impl AudioPassthrough {
    pub fn new(capture: AudioCapture, volume: f32) -> Self {
        Self {
            capture,
            playback: None,
            pump: None,
            volume,
        }
    }

    /// Start capture, then open playback at the rate the device accepted
    ///
    /// On any failure everything started so far is stopped again.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.is_running() {
            return Ok(());
        }
        self.stop();

        self.capture.start()?;
        let Some(params) = self.capture.params() else {
            self.capture.stop();
            return Err(AudioError::Negotiation("capture reported no parameters".into()));
        };

        let mut playback = AudioPlayback::new(params.sample_rate, params.channels);
        playback.set_volume(self.volume);
        if let Err(e) = playback.start() {
            self.capture.stop();
            return Err(e);
        }

        let pump = match spawn_pump(self.capture.shared_buffer(), playback.handle()) {
            Ok(pump) => pump,
            Err(e) => {
                playback.stop();
                self.capture.stop();
                return Err(e);
            }
        };

        info!(device = %self.capture.device(), "Audio passthrough started");
        self.playback = Some(playback);
        self.pump = Some(pump);
        Ok(())
    }

    /// Idempotent
    pub fn stop(&mut self) {
        if let Some(mut pump) = self.pump.take() {
            pump.stop();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
        self.capture.stop();
    }

    /// False once stopped or after the capture device failed
    pub fn is_running(&self) -> bool {
        self.pump.is_some() && self.capture.is_running()
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(playback) = &self.playback {
            playback.set_volume(volume);
            self.volume = playback.volume();
        } else {
            self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn device(&self) -> &str {
        self.capture.device()
    }

    /// Tear down if capture died underneath a running pump
    ///
    /// Returns whether audio is still live.
    pub fn check_health(&mut self) -> bool {
        if self.pump.is_some() && !self.capture.is_running() {
            warn!(device = %self.capture.device(), "Audio capture stopped unexpectedly");
            self.stop();
            return false;
        }
        self.pump.is_some()
    }
}

impl Drop for AudioPassthrough {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the thread that feeds `sink` from `source`
pub fn spawn_pump(
    source: Arc<DoubleBuffer>,
    sink: PlaybackHandle,
) -> Result<CaptureLoopController, AudioError> {
    CaptureLoopController::start("audio-pump", move || {
        if !pump_once(&source, &sink) {
            thread::sleep(AUDIO_PUMP_INTERVAL);
        }
        LoopAction::Continue
    })
    .map_err(AudioError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::audio::capture::AudioFrame;

    fn period(samples: Vec<i16>, frame_count: usize) -> AudioFrame {
        AudioFrame {
            samples,
            frame_count,
            sample_rate: 8_000,
            channels: 2,
        }
    }

    #[test]
    fn test_pump_moves_each_period_once() {
        let source = DoubleBuffer::new();
        let sink = AudioPlayback::new(8_000, 2).handle();

        assert!(!pump_once(&source, &sink));

        let mut back = period(vec![1, 2, 3, 4], 2);
        source.publish(&mut back);
        assert!(pump_once(&source, &sink));
        assert_eq!(sink.queued(), 4);

        // Already consumed
        assert!(!pump_once(&source, &sink));
        assert_eq!(sink.queued(), 4);
    }

    #[test]
    fn test_pump_thread_feeds_sink() {
        let source = Arc::new(DoubleBuffer::new());
        let sink = AudioPlayback::new(8_000, 2).handle();
        let mut pump = spawn_pump(Arc::clone(&source), sink.clone()).unwrap();

        let mut back = period(vec![5; 8], 4);
        source.publish(&mut back);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while sink.queued() < 8 && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(1));
        }
        pump.stop();
        assert_eq!(sink.queued(), 8);
    }

    #[test]
    fn test_stop_before_start() {
        let mut passthrough = AudioPassthrough::new(AudioCapture::new("default", 48_000, 2, 1024), 0.5);
        passthrough.stop();
        passthrough.stop();
        assert!(!passthrough.is_running());
        passthrough.set_volume(2.0);
        assert_eq!(passthrough.volume(), 1.0);
    }
}
