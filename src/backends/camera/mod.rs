// SPDX-License-Identifier: MPL-2.0

//! Video capture backend
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   Consumer (render loop)     │  get_frame(), never blocks
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │  FrameRing<VideoFrame>       │  latest-wins handoff
//! └──────────────▲───────────────┘
//!                │ push
//! ┌──────────────┴───────────────┐
//! │  CaptureWorker               │  capture thread
//! │   wait → DQBUF → decode →    │
//! │   push → QBUF                │
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │  V4l2Session (mmap arena)    │
//! └──────────────────────────────┘
//! ```

pub mod device;
pub mod frame_loop;
pub mod handoff;
pub mod types;
pub mod v4l2_stream;
pub mod v4l2_utils;

pub use device::{CaptureDevice, CaptureWorker, DequeuedFrame};
pub use frame_loop::{CaptureLoopController, LoopAction};
pub use handoff::FrameRing;
pub use types::*;
pub use v4l2_stream::V4l2Session;
pub use v4l2_utils::{list_video_devices, query_formats, query_formats_for, resolve_video_device};

use std::sync::Arc;

use tracing::{debug, info};

use crate::constants::video::{DEFAULT_BUFFER_COUNT, DEFAULT_RING_CAPACITY};
use crate::errors::CaptureError;
use types::StatsCounters;

/// Video capture source
///
/// Owns one capture thread while running. The device, its buffers and the
/// decoder all live on that thread and are released when it exits.
pub struct VideoCapture {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
    encoding: PixelEncoding,
    buffer_count: u32,
    warmup_frames: Option<u32>,
    ring: Arc<FrameRing<VideoFrame>>,
    stats: Arc<StatsCounters>,
    controller: Option<CaptureLoopController>,
    format: Option<CaptureFormat>,
}

impl VideoCapture {
    pub fn new(
        device: impl Into<String>,
        width: u32,
        height: u32,
        fps: u32,
        encoding: PixelEncoding,
        ring_capacity: usize,
    ) -> Self {
        let ring_capacity = if ring_capacity == 0 {
            DEFAULT_RING_CAPACITY
        } else {
            ring_capacity
        };
        Self {
            device: device.into(),
            width,
            height,
            fps,
            encoding,
            buffer_count: DEFAULT_BUFFER_COUNT,
            warmup_frames: None,
            ring: Arc::new(FrameRing::new(ring_capacity)),
            stats: Arc::new(StatsCounters::default()),
            controller: None,
            format: None,
        }
    }

    /// Number of driver buffers to request (at least two are always used)
    pub fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    /// Frames discarded after stream-on; defaults to one second's worth
    pub fn with_warmup_frames(mut self, frames: u32) -> Self {
        self.warmup_frames = Some(frames);
        self
    }

    /// Open the device and start the capture thread
    ///
    /// Returns once the device is streaming. Any failure to open, negotiate,
    /// map or stream leaves the source stopped. Does nothing if already
    /// running.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_running() {
            debug!(device = %self.device, "Video capture already running");
            return Ok(());
        }
        // A loop that exited on its own still holds a finished thread
        self.stop();

        let (device, width, height, fps, encoding, buffer_count) = (
            self.device.clone(),
            self.width,
            self.height,
            self.fps,
            self.encoding,
            self.buffer_count,
        );
        let open = move || V4l2Session::open(&device, width, height, fps, encoding, buffer_count);
        self.start_with(open)
    }

    /// Start the capture thread over any [`CaptureDevice`]
    ///
    /// `open` runs on the capture thread; the device never crosses threads.
    pub fn start_with<D, O>(&mut self, open: O) -> Result<(), CaptureError>
    where
        D: CaptureDevice + 'static,
        O: FnOnce() -> Result<D, CaptureError> + Send + 'static,
    {
        if self.is_running() {
            return Ok(());
        }
        self.stop();
        // Frames from an earlier session are stale
        self.ring.clear();

        let ring = Arc::clone(&self.ring);
        let stats = Arc::clone(&self.stats);
        let warmup_override = self.warmup_frames;
        let (format_tx, format_rx) = std::sync::mpsc::channel();

        let controller = CaptureLoopController::start_with_init(
            "video-capture",
            move || {
                let device = open()?;
                let format = device.format();
                let _ = format_tx.send(format);
                let warmup = warmup_override.unwrap_or(format.fps);
                Ok::<_, CaptureError>(CaptureWorker::new(device, ring, stats, warmup))
            },
            |worker| worker.step(),
        )?;

        self.format = format_rx.try_recv().ok();
        info!(device = %self.device, format = ?self.format, "Video capture started");
        self.controller = Some(controller);
        Ok(())
    }

    /// Stop the capture thread and release the device
    ///
    /// Idempotent; safe before `start` and from `Drop`.
    pub fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!(device = %self.device, "Video capture stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(CaptureLoopController::is_running)
    }

    /// Newest decoded frame not yet returned, if any; never blocks
    pub fn get_frame(&self) -> Option<VideoFrame> {
        self.ring.pop()
    }

    /// Format the driver agreed to in the current or last session
    pub fn format(&self) -> Option<CaptureFormat> {
        self.format
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::device::fake::{Event, FakeDevice};
    use super::*;
    use std::time::{Duration, Instant};

    fn yuyv_format() -> CaptureFormat {
        CaptureFormat {
            width: 2,
            height: 1,
            fps: 30,
            encoding: PixelEncoding::Yuyv,
        }
    }

    fn wait_for_frame(capture: &VideoCapture) -> Option<VideoFrame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(frame) = capture.get_frame() {
                return Some(frame);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_stop_before_start_and_twice() {
        let mut capture = VideoCapture::new("/dev/null", 640, 480, 30, PixelEncoding::Mjpeg, 4);
        capture.stop();
        capture.stop();
        assert!(!capture.is_running());
        assert!(capture.get_frame().is_none());
    }

    #[test]
    fn test_start_failure_leaves_source_stopped() {
        let mut capture = VideoCapture::new("/dev/null", 640, 480, 30, PixelEncoding::Mjpeg, 4);
        let result = capture.start_with(|| -> Result<FakeDevice, CaptureError> {
            Err(CaptureError::FormatNegotiation("unsupported".into()))
        });
        assert!(matches!(result, Err(CaptureError::FormatNegotiation(_))));
        assert!(!capture.is_running());
    }

    #[test]
    fn test_open_failure_on_missing_device() {
        let mut capture =
            VideoCapture::new("/dev/does-not-exist-video", 640, 480, 30, PixelEncoding::Mjpeg, 4);
        assert!(matches!(
            capture.start(),
            Err(CaptureError::OpenFailed { .. })
        ));
        assert!(!capture.is_running());
    }

    #[test]
    fn test_frames_flow_from_fake_device() {
        let mut capture = VideoCapture::new("fake", 2, 1, 30, PixelEncoding::Yuyv, 4)
            .with_warmup_frames(1);
        let events = vec![
            Event::Frame(vec![16, 128, 16, 128]),
            Event::Frame(vec![235, 128, 235, 128]),
        ];
        capture
            .start_with(move || Ok(FakeDevice::new(yuyv_format(), 4, events)))
            .unwrap();
        assert!(capture.is_running());
        assert_eq!(capture.format(), Some(yuyv_format()));

        let frame = wait_for_frame(&capture).expect("decoded frame");
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.data, vec![255; 6]);

        capture.stop();
        capture.stop();
        assert!(!capture.is_running());
        let stats = capture.stats();
        assert_eq!(stats.captured, 2);
        assert_eq!(stats.decoded, 1);
    }

    #[test]
    fn test_restart_drops_previous_session_frame() {
        let mut capture = VideoCapture::new("fake", 2, 1, 30, PixelEncoding::Yuyv, 4)
            .with_warmup_frames(0);
        capture
            .start_with(|| {
                Ok(FakeDevice::new(
                    yuyv_format(),
                    2,
                    vec![Event::Frame(vec![16, 128, 16, 128])],
                ))
            })
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while capture.stats().decoded == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        capture.stop();
        assert_eq!(capture.stats().decoded, 1);

        capture
            .start_with(|| Ok(FakeDevice::new(yuyv_format(), 2, Vec::new())))
            .unwrap();
        assert!(capture.get_frame().is_none());
    }

    #[test]
    fn test_start_while_running_is_noop() {
        let mut capture = VideoCapture::new("fake", 2, 1, 30, PixelEncoding::Yuyv, 1);
        capture
            .start_with(|| Ok(FakeDevice::new(yuyv_format(), 2, Vec::new())))
            .unwrap();
        capture
            .start_with(|| -> Result<FakeDevice, CaptureError> {
                Err(CaptureError::StreamStart("should not be called".into()))
            })
            .unwrap();
        assert!(capture.is_running());
    }
}
