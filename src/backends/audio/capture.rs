// SPDX-License-Identifier: GPL-3.0-only

//! ALSA audio capture
//!
//! The capture thread reads one period at a time into a buffer it owns, then
//! swaps that buffer with the published one under a single lock. Readers
//! copy the published buffer and mark it consumed, so a period is handed
//! out at most once and never while half-written.

use std::sync::{Arc, Mutex, PoisonError};

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use tracing::{debug, error, info, trace, warn};

use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::errors::AudioError;

/// Interleaved S16 PCM from one capture period
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFrame {
    /// Interleaved samples; only the first `frame_count * channels` are valid
    pub samples: Vec<i16>,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub channels: u32,
}

impl AudioFrame {
    fn with_period(params: PcmParams) -> Self {
        Self {
            samples: vec![0; params.period_size * params.channels as usize],
            frame_count: 0,
            sample_rate: params.sample_rate,
            channels: params.channels,
        }
    }

    /// The valid interleaved samples
    pub fn valid_samples(&self) -> &[i16] {
        let len = (self.frame_count * self.channels as usize).min(self.samples.len());
        &self.samples[..len]
    }
}

/// Parameters a PCM device accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    pub sample_rate: u32,
    pub channels: u32,
    /// Frames per period
    pub period_size: usize,
}

/// Read failure from a [`PcmSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcmReadError {
    /// The driver recovered (overrun, suspend); reading can continue
    Recovered(String),
    /// The device is unusable
    Fatal(String),
}

/// A blocking source of interleaved S16 PCM
pub trait PcmSource {
    fn params(&self) -> PcmParams;

    /// Read up to `buf.len() / channels` frames, returning the frame count
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PcmReadError>;
}

struct Published {
    frame: AudioFrame,
    swaps: u64,
}

/// Two-slot audio exchange between the capture thread and a reader
///
/// The writer keeps the back buffer outside the lock and only takes the lock
/// to swap it with the published front buffer.
pub struct DoubleBuffer {
    front: Mutex<Published>,
}

impl DoubleBuffer {
    pub fn new() -> Self {
        Self {
            front: Mutex::new(Published {
                frame: AudioFrame::default(),
                swaps: 0,
            }),
        }
    }

    /// Publish `back`; `back` receives the previous front buffer for reuse
    pub fn publish(&self, back: &mut AudioFrame) {
        let mut front = self.front.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::swap(&mut front.frame, back);
        front.swaps += 1;
        trace!(swaps = front.swaps, frames = front.frame.frame_count, "Published audio period");
    }

    /// Copy out the published frame if it has not been read yet
    pub fn take(&self) -> Option<AudioFrame> {
        let mut front = self.front.lock().unwrap_or_else(PoisonError::into_inner);
        if front.frame.frame_count == 0 {
            return None;
        }
        let frame = AudioFrame {
            samples: front.frame.valid_samples().to_vec(),
            frame_count: front.frame.frame_count,
            sample_rate: front.frame.sample_rate,
            channels: front.frame.channels,
        };
        front.frame.frame_count = 0;
        Some(frame)
    }

    /// Number of buffer swaps so far
    pub fn swaps(&self) -> u64 {
        self.front
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .swaps
    }
}

impl Default for DoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// ALSA PCM capture handle, S16_LE interleaved
pub struct AlsaSource {
    pcm: PCM,
    params: PcmParams,
}

impl AlsaSource {
    /// Open `device` and negotiate hardware parameters
    ///
    /// Rate and period size are requested "near"; the values the driver
    /// picks are reported by [`PcmSource::params`].
    pub fn open(
        device: &str,
        sample_rate: u32,
        channels: u32,
        period_size: usize,
    ) -> Result<Self, AudioError> {
        info!(device = %device, sample_rate, channels, period_size, "Opening ALSA capture device");

        let pcm = PCM::new(device, Direction::Capture, false).map_err(|e| {
            AudioError::OpenFailed {
                device: device.to_string(),
                reason: e.to_string(),
            }
        })?;

        let params = {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(Format::S16LE)?;
            hwp.set_channels(channels)?;

            let actual_rate = hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
            if actual_rate != sample_rate {
                info!(requested = sample_rate, actual = actual_rate, "Sample rate adjusted");
            }

            let requested_period = period_size as alsa::pcm::Frames;
            let actual_period = hwp.set_period_size_near(requested_period, ValueOr::Nearest)?;
            if actual_period != requested_period {
                info!(
                    requested = period_size,
                    actual = actual_period,
                    "Period size adjusted"
                );
            }

            pcm.hw_params(&hwp)?;

            PcmParams {
                sample_rate: actual_rate,
                channels,
                period_size: usize::try_from(actual_period)
                    .ok()
                    .filter(|&p| p > 0)
                    .unwrap_or(period_size),
            }
        };

        pcm.prepare()?;

        info!(
            device = %device,
            sample_rate = params.sample_rate,
            channels = params.channels,
            period_size = params.period_size,
            "Audio capture initialized"
        );

        Ok(Self { pcm, params })
    }
}

impl PcmSource for AlsaSource {
    fn params(&self) -> PcmParams {
        self.params
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PcmReadError> {
        let io = self
            .pcm
            .io_i16()
            .map_err(|e| PcmReadError::Fatal(e.to_string()))?;

        match io.readi(buf) {
            Ok(frames) => Ok(frames),
            Err(e) => {
                let message = e.to_string();
                match self.pcm.try_recover(e, true) {
                    Ok(()) => Err(PcmReadError::Recovered(message)),
                    Err(e) => Err(PcmReadError::Fatal(e.to_string())),
                }
            }
        }
    }
}

/// Loop state for one audio capture session
pub struct AudioCaptureWorker<S: PcmSource> {
    source: S,
    back: AudioFrame,
    buffer: Arc<DoubleBuffer>,
    period_size: usize,
}

impl<S: PcmSource> AudioCaptureWorker<S> {
    pub fn new(source: S, buffer: Arc<DoubleBuffer>) -> Self {
        let params = source.params();
        Self {
            back: AudioFrame::with_period(params),
            period_size: params.period_size,
            source,
            buffer,
        }
    }

    /// Read one period and publish it
    pub fn step(&mut self) -> LoopAction {
        match self.source.read(&mut self.back.samples) {
            Ok(frames) => {
                if frames != self.period_size {
                    debug!(expected = self.period_size, got = frames, "Short audio read");
                }
                if frames == 0 {
                    return LoopAction::Continue;
                }
                self.back.frame_count = frames;
                self.buffer.publish(&mut self.back);
                self.prepare_back();
                LoopAction::Continue
            }
            Err(PcmReadError::Recovered(e)) => {
                warn!(error = %e, "Audio capture recovered from error");
                LoopAction::Continue
            }
            Err(PcmReadError::Fatal(e)) => {
                error!(error = %e, "Audio capture error");
                LoopAction::Stop
            }
        }
    }

    /// Make the swapped-in buffer ready for the next period
    fn prepare_back(&mut self) {
        let params = self.source.params();
        let len = params.period_size * params.channels as usize;
        self.back.samples.resize(len, 0);
        self.back.frame_count = 0;
        self.back.sample_rate = params.sample_rate;
        self.back.channels = params.channels;
    }
}

/// Audio capture source
///
/// The PCM handle lives on the capture thread and is closed when it exits.
pub struct AudioCapture {
    device: String,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
    buffer: Arc<DoubleBuffer>,
    controller: Option<CaptureLoopController>,
    params: Option<PcmParams>,
}

impl AudioCapture {
    pub fn new(device: impl Into<String>, sample_rate: u32, channels: u32, period_size: usize) -> Self {
        Self {
            device: device.into(),
            sample_rate,
            channels,
            period_size,
            buffer: Arc::new(DoubleBuffer::new()),
            controller: None,
            params: None,
        }
    }

    /// Open the ALSA device and start the capture thread
    ///
    /// Does nothing if already running.
    pub fn start(&mut self) -> Result<(), AudioError> {
        let (device, rate, channels, period) = (
            self.device.clone(),
            self.sample_rate,
            self.channels,
            self.period_size,
        );
        self.start_with(move || AlsaSource::open(&device, rate, channels, period))
    }

    /// Start the capture thread over any [`PcmSource`]
    ///
    /// `open` runs on the capture thread.
    pub fn start_with<S, O>(&mut self, open: O) -> Result<(), AudioError>
    where
        S: PcmSource + 'static,
        O: FnOnce() -> Result<S, AudioError> + Send + 'static,
    {
        if self.is_running() {
            debug!(device = %self.device, "Audio capture already running");
            return Ok(());
        }
        self.stop();

        let buffer = Arc::clone(&self.buffer);
        let (params_tx, params_rx) = std::sync::mpsc::channel();

        let controller = CaptureLoopController::start_with_init(
            "audio-capture",
            move || {
                let source = open()?;
                let _ = params_tx.send(source.params());
                Ok::<_, AudioError>(AudioCaptureWorker::new(source, buffer))
            },
            |worker| worker.step(),
        )?;

        self.params = params_rx.try_recv().ok();
        info!(device = %self.device, params = ?self.params, "Audio capture started");
        self.controller = Some(controller);
        Ok(())
    }

    /// Stop the capture thread and close the device
    ///
    /// Idempotent; safe before `start` and from `Drop`. A blocking read
    /// delays the join by at most one period.
    pub fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!(device = %self.device, "Audio capture stopped");
        }
    }

    /// False once stopped or after an unrecoverable device error
    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(CaptureLoopController::is_running)
    }

    /// Copy of the newest captured period, if not already returned
    pub fn get_audio_frame(&self) -> Option<AudioFrame> {
        self.buffer.take()
    }

    /// Parameters the device accepted in the current or last session
    pub fn params(&self) -> Option<PcmParams> {
        self.params
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Shared handle to the published period, for consumers on other threads
    pub fn shared_buffer(&self) -> Arc<DoubleBuffer> {
        Arc::clone(&self.buffer)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakePcm, Read};
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    const PARAMS: PcmParams = PcmParams {
        sample_rate: 48_000,
        channels: 2,
        period_size: 4,
    };

    #[test]
    fn test_take_copies_then_clears() {
        let buffer = DoubleBuffer::new();
        assert!(buffer.take().is_none());

        let mut back = AudioFrame::with_period(PARAMS);
        back.samples.fill(5);
        back.frame_count = 4;
        buffer.publish(&mut back);

        let frame = buffer.take().unwrap();
        assert_eq!(frame.frame_count, 4);
        assert_eq!(frame.samples, vec![5; 8]);
        assert!(buffer.take().is_none());
        assert_eq!(buffer.swaps(), 1);
    }

    #[test]
    fn test_publish_hands_back_previous_front() {
        let buffer = DoubleBuffer::new();
        let mut back = AudioFrame::with_period(PARAMS);
        back.samples.fill(1);
        back.frame_count = 4;
        buffer.publish(&mut back);
        // The initial front buffer is empty
        assert!(back.samples.is_empty());

        let mut next = AudioFrame::with_period(PARAMS);
        next.samples.fill(2);
        next.frame_count = 4;
        buffer.publish(&mut next);
        // Unread period 1 comes back to the writer, period 2 is published
        assert_eq!(next.samples, vec![1; 8]);
        assert_eq!(buffer.take().map(|f| f.samples), Some(vec![2; 8]));

        buffer.publish(&mut next);
        assert_eq!(next.samples, vec![2; 8]);
        assert_eq!(buffer.swaps(), 3);
    }

    #[test]
    fn test_short_read_publishes_valid_part_only() {
        let buffer = Arc::new(DoubleBuffer::new());
        let source = FakePcm::new(PARAMS, vec![Read::Frames(2, 9)]);
        let mut worker = AudioCaptureWorker::new(source, Arc::clone(&buffer));

        assert_eq!(worker.step(), LoopAction::Continue);
        let frame = buffer.take().unwrap();
        assert_eq!(frame.frame_count, 2);
        assert_eq!(frame.samples, vec![9; 4]);
        assert_eq!(frame.sample_rate, 48_000);
    }

    #[test]
    fn test_recoverable_error_continues_fatal_stops() {
        let buffer = Arc::new(DoubleBuffer::new());
        let source = FakePcm::new(PARAMS, vec![Read::Recoverable, Read::Fatal]);
        let mut worker = AudioCaptureWorker::new(source, Arc::clone(&buffer));

        assert_eq!(worker.step(), LoopAction::Continue);
        assert_eq!(worker.step(), LoopAction::Stop);
        assert!(buffer.take().is_none());
    }

    #[test]
    fn test_reader_never_sees_mixed_periods() {
        let buffer = Arc::new(DoubleBuffer::new());
        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut back = AudioFrame::with_period(PcmParams {
                    period_size: 256,
                    ..PARAMS
                });
                for value in 1..=2_000i16 {
                    back.samples.fill(value);
                    back.frame_count = 256;
                    buffer.publish(&mut back);
                    back.samples.resize(512, 0);
                }
            })
        };

        while !writer.is_finished() {
            if let Some(frame) = buffer.take() {
                let first = frame.samples[0];
                assert!(frame.samples.iter().all(|&s| s == first), "torn period");
                assert_eq!(frame.samples.len(), 512);
            }
        }
        writer.join().unwrap();
        assert_eq!(buffer.swaps(), 2_000);
    }

    #[test]
    fn test_unrecoverable_error_clears_running() {
        let mut capture = AudioCapture::new("fake", 48_000, 2, 4);
        capture
            .start_with(|| Ok(FakePcm::new(PARAMS, vec![Read::Frames(4, 1), Read::Fatal])))
            .unwrap();
        assert_eq!(capture.params(), Some(PARAMS));

        let deadline = Instant::now() + Duration::from_secs(2);
        while capture.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!capture.is_running());
        assert_eq!(capture.get_audio_frame().map(|f| f.samples), Some(vec![1; 8]));
        capture.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut capture = AudioCapture::new("fake", 48_000, 2, 4);
        capture.stop();
        capture
            .start_with(|| Ok(FakePcm::new(PARAMS, Vec::new())))
            .unwrap();
        capture.stop();
        capture.stop();
        assert!(!capture.is_running());
    }

    #[test]
    fn test_open_failure_is_returned() {
        let mut capture = AudioCapture::new("fake", 48_000, 2, 4);
        let result = capture.start_with(|| -> Result<FakePcm, AudioError> {
            Err(AudioError::OpenFailed {
                device: "fake".into(),
                reason: "busy".into(),
            })
        });
        assert!(matches!(result, Err(AudioError::OpenFailed { .. })));
        assert!(!capture.is_running());
    }
}
