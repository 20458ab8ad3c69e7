// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the video capture backend

//! Shared types for video capture

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use crate::media::formats::PixelEncoding;

/// Capture format negotiated with the driver
///
/// Fixed for the lifetime of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub encoding: PixelEncoding,
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps {}",
            self.width, self.height, self.fps, self.encoding
        )
    }
}

/// A decoded frame ready for display
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB24, row-major, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// Driver capture timestamp on the monotonic clock
    pub timestamp: Duration,
}

impl VideoFrame {
    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * 3
    }

    /// RGB triple at (x, y), or None outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * 3;
        self.data
            .get(offset..offset + 3)
            .map(|px| [px[0], px[1], px[2]])
    }
}

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoDeviceInfo {
    /// Device path (e.g., /dev/video0)
    pub path: String,
    /// Name of the device (V4L2 card)
    pub name: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
}

/// One resolution and frame rate a device advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
    }
}

/// Snapshot of a session's frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Buffers dequeued from the driver, warm-up included
    pub captured: u64,
    /// Frames decoded and pushed to the handoff buffer
    pub decoded: u64,
    /// Frames dropped because the decoder rejected them
    pub dropped_malformed: u64,
    /// Failed dequeue attempts
    pub dequeue_errors: u64,
}

/// Counters shared between the capture thread and readers
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    captured: AtomicU64,
    decoded: AtomicU64,
    dropped_malformed: AtomicU64,
    dequeue_errors: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeue_error(&self) {
        self.dequeue_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            captured: self.captured.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dequeue_errors: self.dequeue_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pixel_lookup() {
        let frame = VideoFrame {
            width: 2,
            height: 1,
            data: vec![1, 2, 3, 4, 5, 6],
            timestamp: Duration::ZERO,
        };
        assert_eq!(frame.pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, 1), None);
    }

    #[test]
    fn test_format_display() {
        let format = CaptureFormat {
            width: 1280,
            height: 720,
            fps: 60,
            encoding: PixelEncoding::Yuyv,
        };
        assert_eq!(format.to_string(), "1280x720 @ 60fps YUYV");
    }

    #[test]
    fn test_stats_snapshot() {
        let counters = StatsCounters::default();
        counters.record_captured();
        counters.record_captured();
        counters.record_decoded();
        counters.record_malformed();
        assert_eq!(
            counters.snapshot(),
            CaptureStats {
                captured: 2,
                decoded: 1,
                dropped_malformed: 1,
                dequeue_errors: 0,
            }
        );
    }
}
