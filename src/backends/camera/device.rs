// SPDX-License-Identifier: GPL-3.0-only

//! Capture device abstraction and the per-iteration acquisition step
//!
//! [`CaptureDevice`] is the seam between the acquisition loop and the
//! kernel. The V4L2 implementation lives in [`super::v4l2_stream`]; tests
//! drive [`CaptureWorker`] with an in-memory device.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use super::frame_loop::LoopAction;
use super::handoff::FrameRing;
use super::types::{CaptureFormat, StatsCounters, VideoFrame};
use crate::constants::video::{ERROR_BACKOFF, MAX_ERROR_BACKOFF, READY_TIMEOUT};
use crate::media::decoders::FrameDecoder;

/// Lease on a buffer the driver has handed back
///
/// Not `Clone`: the only way to give the buffer back is
/// [`CaptureDevice::requeue`], which consumes the lease.
#[derive(Debug)]
pub struct DequeuedFrame {
    index: usize,
    bytes_used: usize,
    timestamp: Option<Duration>,
}

impl DequeuedFrame {
    pub fn new(index: usize, bytes_used: usize, timestamp: Option<Duration>) -> Self {
        Self {
            index,
            bytes_used,
            timestamp,
        }
    }

    /// Buffer slot the driver filled
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of valid bytes in the buffer
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Driver timestamp, when the driver set one
    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }
}

/// A streaming video source with a fixed pool of driver buffers
pub trait CaptureDevice {
    /// Format negotiated when the device was opened
    fn format(&self) -> CaptureFormat;

    /// Wait until a filled buffer is available
    ///
    /// Returns `Ok(false)` when `timeout` elapses first.
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Take the next filled buffer from the driver
    fn dequeue(&mut self) -> io::Result<DequeuedFrame>;

    /// Valid bytes of a dequeued buffer
    fn data(&self, frame: &DequeuedFrame) -> &[u8];

    /// Return a buffer to the driver
    fn requeue(&mut self, frame: DequeuedFrame) -> io::Result<()>;
}

/// ENODEV after unplug; retrying can never succeed
fn is_device_gone(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENODEV)
}

/// Loop state for one video capture session
pub struct CaptureWorker<D: CaptureDevice> {
    device: D,
    decoder: FrameDecoder,
    ring: Arc<FrameRing<VideoFrame>>,
    stats: Arc<StatsCounters>,
    warmup_remaining: u32,
    epoch: Instant,
    /// Wait or dequeue failures since the last good buffer
    consecutive_errors: u32,
}

impl<D: CaptureDevice> CaptureWorker<D> {
    pub(crate) fn new(
        device: D,
        ring: Arc<FrameRing<VideoFrame>>,
        stats: Arc<StatsCounters>,
        warmup_frames: u32,
    ) -> Self {
        let format = device.format();
        info!(
            format = %format,
            warmup_frames,
            "Video capture session ready"
        );
        Self {
            decoder: FrameDecoder::for_format(&format),
            device,
            ring,
            stats,
            warmup_remaining: warmup_frames,
            epoch: Instant::now(),
            consecutive_errors: 0,
        }
    }

    /// One acquisition iteration: wait, dequeue, decode, push, re-queue
    pub fn step(&mut self) -> LoopAction {
        match self.device.wait_ready(READY_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => {
                trace!("Timed out waiting for a video buffer");
                return LoopAction::Continue;
            }
            Err(e) if is_device_gone(&e) => {
                error!(error = %e, "Video device disappeared, stopping capture");
                return LoopAction::Stop;
            }
            Err(e) => {
                warn!(error = %e, "Waiting for video buffer failed");
                self.back_off();
                return LoopAction::Continue;
            }
        }

        let frame = match self.device.dequeue() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.record_dequeue_error();
                if is_device_gone(&e) {
                    error!(error = %e, "Video device disappeared, stopping capture");
                    return LoopAction::Stop;
                }
                warn!(error = %e, "Error dequeueing buffer");
                self.back_off();
                return LoopAction::Continue;
            }
        };
        self.consecutive_errors = 0;
        self.stats.record_captured();

        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            if self.warmup_remaining == 0 {
                debug!("Warm-up complete");
            }
        } else {
            self.decode_and_push(&frame);
        }

        let index = frame.index();
        if let Err(e) = self.device.requeue(frame) {
            warn!(index, error = %e, "Error re-queueing buffer");
        }

        LoopAction::Continue
    }

    /// Sleep before retrying a device that keeps failing
    fn back_off(&mut self) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        let delay = backoff_delay(self.consecutive_errors);
        trace!(errors = self.consecutive_errors, ?delay, "Backing off");
        std::thread::sleep(delay);
    }

    fn decode_and_push(&mut self, frame: &DequeuedFrame) {
        let data = self.device.data(frame);
        let mut rgb = Vec::new();
        match self.decoder.decode(data, &mut rgb) {
            Ok((width, height)) => {
                let timestamp = frame
                    .timestamp()
                    .unwrap_or_else(|| self.epoch.elapsed());
                self.ring.push(VideoFrame {
                    width,
                    height,
                    data: rgb,
                    timestamp,
                });
                self.stats.record_decoded();
            }
            Err(e) => {
                self.stats.record_malformed();
                debug!(
                    index = frame.index(),
                    bytes = frame.bytes_used(),
                    error = %e,
                    "Dropping malformed frame"
                );
            }
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

/// Pause after the `errors`-th failure in a row
fn backoff_delay(errors: u32) -> Duration {
    let doublings = errors.saturating_sub(1).min(16);
    ERROR_BACKOFF
        .saturating_mul(1 << doublings)
        .min(MAX_ERROR_BACKOFF)
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory capture device for loop tests

    use super::*;
    use std::collections::VecDeque;

    /// What the fake device does on the next readiness wait
    #[derive(Debug, Clone)]
    pub enum Event {
        /// Buffer `data` becomes ready
        Frame(Vec<u8>),
        /// The wait times out
        Timeout,
        /// The wait reports ready but the dequeue fails
        DequeueError,
        /// The device was unplugged; the dequeue reports it
        Unplugged,
        /// The wait itself fails without an errno
        WaitError,
        /// The wait sees the device hang up
        Hangup,
    }

    pub struct FakeDevice {
        pub format: CaptureFormat,
        pub events: VecDeque<Event>,
        buffers: Vec<Vec<u8>>,
        queued: Vec<bool>,
        next: usize,
        pending: Option<Event>,
        pub requeued: usize,
        pub timestamp: Option<Duration>,
    }

    impl FakeDevice {
        pub fn new(format: CaptureFormat, buffer_count: usize, events: Vec<Event>) -> Self {
            Self {
                format,
                events: events.into(),
                buffers: vec![Vec::new(); buffer_count],
                queued: vec![true; buffer_count],
                next: 0,
                pending: None,
                requeued: 0,
                timestamp: None,
            }
        }

        pub fn all_queued(&self) -> bool {
            self.queued.iter().all(|&q| q)
        }
    }

    impl CaptureDevice for FakeDevice {
        fn format(&self) -> CaptureFormat {
            self.format
        }

        fn wait_ready(&mut self, _timeout: Duration) -> io::Result<bool> {
            match self.events.pop_front() {
                Some(Event::Timeout) | None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Ok(false)
                }
                Some(Event::WaitError) => Err(io::Error::other("poll reported POLLERR")),
                Some(Event::Hangup) => Err(io::Error::from_raw_os_error(libc::ENODEV)),
                Some(event) => {
                    self.pending = Some(event);
                    Ok(true)
                }
            }
        }

        fn dequeue(&mut self) -> io::Result<DequeuedFrame> {
            match self.pending.take() {
                Some(Event::Frame(data)) => {
                    let index = self.next;
                    assert!(self.queued[index], "buffer {} dequeued twice", index);
                    self.next = (self.next + 1) % self.buffers.len();
                    self.queued[index] = false;
                    let len = data.len();
                    self.buffers[index] = data;
                    Ok(DequeuedFrame::new(index, len, self.timestamp))
                }
                Some(Event::Unplugged) => Err(io::Error::from_raw_os_error(libc::ENODEV)),
                _ => Err(io::Error::from_raw_os_error(libc::EIO)),
            }
        }

        fn data(&self, frame: &DequeuedFrame) -> &[u8] {
            &self.buffers[frame.index()][..frame.bytes_used()]
        }

        fn requeue(&mut self, frame: DequeuedFrame) -> io::Result<()> {
            self.queued[frame.index()] = true;
            self.requeued += 1;
            Ok(())
        }
    }
}
