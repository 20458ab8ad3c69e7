// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 streaming session over memory-mapped driver buffers
//!
//! The device is opened and the format negotiated through the `v4l` crate.
//! Buffer management uses the raw REQBUFS/QUERYBUF/QBUF/DQBUF ioctls so that
//! each buffer can be leased out by index and handed back explicitly, which
//! the `v4l` stream iterator does not expose.
//!
//! Buffers live in an arena of indexed slots. A slot is either queued
//! (owned by the driver) or dequeued (leased to the capture loop). Mappings
//! are released when the session drops.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

use super::device::{CaptureDevice, DequeuedFrame};
use super::types::{CaptureFormat, PixelEncoding};
use crate::constants::video::MIN_BUFFER_COUNT;
use crate::errors::CaptureError;

const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
const V4L2_MEMORY_MMAP: u32 = 1;

/// V4L2 request buffers structure for VIDIOC_REQBUFS
#[allow(dead_code)]
#[repr(C)]
#[derive(Default)]
struct V4l2RequestBuffers {
    count: u32,
    type_: u32,
    memory: u32,
    capabilities: u32,
    flags: u8,
    reserved: [u8; 3],
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
struct V4l2Timecode {
    type_: u32,
    flags: u32,
    frames: u8,
    seconds: u8,
    minutes: u8,
    hours: u8,
    userbits: [u8; 4],
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
union V4l2BufferMemory {
    offset: u32,
    userptr: libc::c_ulong,
    planes: *mut libc::c_void,
    fd: i32,
}

/// V4L2 buffer structure for QUERYBUF/QBUF/DQBUF
#[allow(dead_code)]
#[repr(C)]
struct V4l2Buffer {
    index: u32,
    type_: u32,
    bytesused: u32,
    flags: u32,
    field: u32,
    timestamp: libc::timeval,
    timecode: V4l2Timecode,
    sequence: u32,
    memory: u32,
    m: V4l2BufferMemory,
    length: u32,
    reserved2: u32,
    request_fd: i32,
}

impl V4l2Buffer {
    fn mmap_capture(index: u32) -> Self {
        // SAFETY: all-zero is a valid value for this plain C struct
        let mut buf: Self = unsafe { std::mem::zeroed() };
        buf.index = index;
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = V4L2_MEMORY_MMAP;
        buf
    }
}

const fn ioc(dir: u32, nr: u32, size: usize) -> libc::c_ulong {
    ((dir << 30) | ((size as u32) << 16) | ((b'V' as u32) << 8) | nr) as libc::c_ulong
}

const IOC_WRITE: u32 = 1;
const IOC_READ_WRITE: u32 = 3;

const VIDIOC_REQBUFS: libc::c_ulong =
    ioc(IOC_READ_WRITE, 8, std::mem::size_of::<V4l2RequestBuffers>());
const VIDIOC_QUERYBUF: libc::c_ulong = ioc(IOC_READ_WRITE, 9, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_QBUF: libc::c_ulong = ioc(IOC_READ_WRITE, 15, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_DQBUF: libc::c_ulong = ioc(IOC_READ_WRITE, 17, std::mem::size_of::<V4l2Buffer>());
const VIDIOC_STREAMON: libc::c_ulong = ioc(IOC_WRITE, 18, std::mem::size_of::<libc::c_int>());
const VIDIOC_STREAMOFF: libc::c_ulong = ioc(IOC_WRITE, 19, std::mem::size_of::<libc::c_int>());

/// ioctl that restarts when interrupted by a signal
fn xioctl<T>(fd: RawFd, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `arg` points to a live #[repr(C)] value matching `request`
        let r = unsafe { libc::ioctl(fd, request as _, arg as *mut T) };
        if r >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// CLOCK_MONOTONIC, the clock V4L2 stamps buffers with
fn monotonic_now() -> Duration {
    // SAFETY: zeroed timespec is valid and clock_gettime only writes to it
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec.clamp(0, 999_999_999) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Queued,
    Dequeued,
}

/// One driver buffer mapped into our address space
struct MappedBuffer {
    ptr: NonNull<u8>,
    length: usize,
    state: SlotState,
}

impl MappedBuffer {
    fn map(fd: RawFd, index: u32) -> Result<Self, CaptureError> {
        let mut buf = V4l2Buffer::mmap_capture(index);
        xioctl(fd, VIDIOC_QUERYBUF, &mut buf).map_err(|e| {
            CaptureError::BufferRequest(format!("querying buffer {}: {}", index, e))
        })?;

        let length = buf.length as usize;
        // SAFETY: MMAP buffers use the `offset` member of the union
        let offset = unsafe { buf.m.offset };

        // SAFETY: length and offset come from the driver for this fd
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CaptureError::BufferMapping {
                index: index as usize,
                reason: io::Error::last_os_error().to_string(),
            });
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| CaptureError::BufferMapping {
            index: index as usize,
            reason: "driver mapped buffer at null".to_string(),
        })?;

        // Not handed to the driver until the pool is complete
        Ok(Self {
            ptr,
            length,
            state: SlotState::Dequeued,
        })
    }

    fn bytes(&self, len: usize) -> &[u8] {
        // SAFETY: the mapping is `length` bytes long and lives as long as self
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), len.min(self.length)) }
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/length are exactly what mmap returned
        let r = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.length) };
        if r < 0 {
            warn!(error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}

/// An open, streaming V4L2 capture device
pub struct V4l2Session {
    // Declared first so mappings are released before the fd closes
    buffers: Vec<MappedBuffer>,
    /// Owns the fd
    _device: Device,
    fd: RawFd,
    format: CaptureFormat,
    path: String,
    streaming: bool,
}

impl V4l2Session {
    /// Open `path`, negotiate the format, map `buffer_count` buffers and stream on
    pub fn open(
        path: &str,
        width: u32,
        height: u32,
        fps: u32,
        encoding: PixelEncoding,
        buffer_count: u32,
    ) -> Result<Self, CaptureError> {
        info!(device = %path, width, height, fps, %encoding, "Opening V4L2 device");

        let device = Device::with_path(path).map_err(|e| CaptureError::OpenFailed {
            device: path.to_string(),
            reason: e.to_string(),
        })?;
        let fd = device.handle().fd();

        let format = negotiate_format(&device, width, height, fps, encoding)?;

        let mut session = Self {
            buffers: Vec::new(),
            _device: device,
            fd,
            format,
            path: path.to_string(),
            streaming: false,
        };
        session.allocate_buffers(buffer_count)?;
        session.stream_on()?;

        info!(
            device = %path,
            format = %session.format,
            buffers = session.buffers.len(),
            "V4L2 streaming started"
        );
        Ok(session)
    }

    fn allocate_buffers(&mut self, requested: u32) -> Result<(), CaptureError> {
        let mut req = V4l2RequestBuffers {
            count: requested.max(MIN_BUFFER_COUNT),
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..Default::default()
        };
        xioctl(self.fd, VIDIOC_REQBUFS, &mut req)
            .map_err(|e| CaptureError::BufferRequest(e.to_string()))?;

        if req.count < MIN_BUFFER_COUNT {
            return Err(CaptureError::BufferRequest(format!(
                "driver granted {} buffers, need at least {}",
                req.count, MIN_BUFFER_COUNT
            )));
        }
        if req.count != requested {
            debug!(requested, granted = req.count, "Driver adjusted buffer count");
        }

        for index in 0..req.count {
            self.buffers.push(MappedBuffer::map(self.fd, index)?);
        }
        Ok(())
    }

    fn stream_on(&mut self) -> Result<(), CaptureError> {
        for index in 0..self.buffers.len() {
            self.queue(index)
                .map_err(|e| CaptureError::StreamStart(format!("queueing buffer {}: {}", index, e)))?;
        }

        let mut buf_type = V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        xioctl(self.fd, VIDIOC_STREAMON, &mut buf_type)
            .map_err(|e| CaptureError::StreamStart(e.to_string()))?;
        self.streaming = true;
        Ok(())
    }

    fn queue(&mut self, index: usize) -> io::Result<()> {
        let mut buf = V4l2Buffer::mmap_capture(index as u32);
        xioctl(self.fd, VIDIOC_QBUF, &mut buf)?;
        self.buffers[index].state = SlotState::Queued;
        Ok(())
    }

}

/// Map `poll` revents on a capture fd to the `wait_ready` result
///
/// POLLERR is not final: vb2 raises it both after unplug and while no
/// buffer is queued, so DQBUF is left to report the real errno.
fn readiness(revents: libc::c_short) -> io::Result<bool> {
    if revents & libc::POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    if revents & libc::POLLHUP != 0 {
        return Err(io::Error::from_raw_os_error(libc::ENODEV));
    }
    Ok(revents & (libc::POLLIN | libc::POLLERR) != 0)
}

fn negotiate_format(
    device: &Device,
    width: u32,
    height: u32,
    fps: u32,
    encoding: PixelEncoding,
) -> Result<CaptureFormat, CaptureError> {
    let fourcc = FourCC::new(encoding.fourcc());
    let actual = device
        .set_format(&Format::new(width, height, fourcc))
        .map_err(|e| CaptureError::FormatNegotiation(e.to_string()))?;

    if actual.fourcc != fourcc {
        return Err(CaptureError::FormatNegotiation(format!(
            "driver chose {} instead of {}",
            actual.fourcc, fourcc
        )));
    }
    if actual.width == 0 || actual.height == 0 {
        return Err(CaptureError::FormatNegotiation(format!(
            "driver returned {}x{}",
            actual.width, actual.height
        )));
    }
    if actual.width != width || actual.height != height {
        debug!(
            requested_width = width,
            requested_height = height,
            width = actual.width,
            height = actual.height,
            "Driver adjusted resolution"
        );
    }

    // Frame interval is advisory; many UVC devices ignore it
    let negotiated_fps = match device.set_params(&Parameters::with_fps(fps)) {
        Ok(params) if params.interval.numerator > 0 => {
            params.interval.denominator / params.interval.numerator
        }
        Ok(_) => fps,
        Err(e) => {
            warn!(fps, error = %e, "Failed to set frame interval");
            fps
        }
    };

    Ok(CaptureFormat {
        width: actual.width,
        height: actual.height,
        fps: negotiated_fps,
        encoding,
    })
}

impl CaptureDevice for V4l2Session {
    fn format(&self) -> CaptureFormat {
        self.format
    }

    fn wait_ready(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: one valid pollfd
        let r = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if r < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(false);
            }
            return Err(err);
        }
        if r == 0 {
            return Ok(false);
        }
        readiness(pfd.revents)
    }

    fn dequeue(&mut self) -> io::Result<DequeuedFrame> {
        let mut buf = V4l2Buffer::mmap_capture(0);
        xioctl(self.fd, VIDIOC_DQBUF, &mut buf)?;

        let index = buf.index as usize;
        let slot = self.buffers.get_mut(index).ok_or_else(|| {
            io::Error::other(format!("driver returned unknown buffer index {}", index))
        })?;
        if slot.state != SlotState::Queued {
            return Err(io::Error::other(format!(
                "buffer {} dequeued while not queued",
                index
            )));
        }
        slot.state = SlotState::Dequeued;

        let timestamp = if buf.timestamp.tv_sec == 0 && buf.timestamp.tv_usec == 0 {
            monotonic_now()
        } else {
            Duration::new(buf.timestamp.tv_sec.max(0) as u64, 0)
                + Duration::from_micros(buf.timestamp.tv_usec.max(0) as u64)
        };

        Ok(DequeuedFrame::new(
            index,
            (buf.bytesused as usize).min(slot.length),
            Some(timestamp),
        ))
    }

    fn data(&self, frame: &DequeuedFrame) -> &[u8] {
        match self.buffers.get(frame.index()) {
            Some(slot) if slot.state == SlotState::Dequeued => slot.bytes(frame.bytes_used()),
            _ => &[],
        }
    }

    fn requeue(&mut self, frame: DequeuedFrame) -> io::Result<()> {
        let index = frame.index();
        match self.buffers.get(index).map(|slot| slot.state) {
            Some(SlotState::Dequeued) => self.queue(index),
            Some(SlotState::Queued) => Err(io::Error::other(format!(
                "buffer {} is already queued",
                index
            ))),
            None => Err(io::Error::other(format!("no buffer with index {}", index))),
        }
    }
}

impl Drop for V4l2Session {
    fn drop(&mut self) {
        if self.streaming {
            let mut buf_type = V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
            if let Err(e) = xioctl(self.fd, VIDIOC_STREAMOFF, &mut buf_type) {
                warn!(device = %self.path, error = %e, "VIDIOC_STREAMOFF failed");
            }
        }
        debug!(device = %self.path, "Closing V4L2 session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_ioctl_numbers_match_kernel_headers() {
        assert_eq!(std::mem::size_of::<V4l2Buffer>(), 88);
        assert_eq!(VIDIOC_REQBUFS, 0xC014_5608);
        assert_eq!(VIDIOC_QUERYBUF, 0xC058_5609);
        assert_eq!(VIDIOC_QBUF, 0xC058_560F);
        assert_eq!(VIDIOC_DQBUF, 0xC058_5611);
        assert_eq!(VIDIOC_STREAMON, 0x4004_5612);
        assert_eq!(VIDIOC_STREAMOFF, 0x4004_5613);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = V4l2Session::open(
            "/dev/does-not-exist-video",
            640,
            480,
            30,
            PixelEncoding::Mjpeg,
            4,
        )
        .err();
        assert!(matches!(err, Some(CaptureError::OpenFailed { .. })));
    }

    #[test]
    fn test_hangup_reads_as_unplug() {
        let err = readiness(libc::POLLHUP | libc::POLLERR).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENODEV));

        let err = readiness(libc::POLLNVAL).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn test_poll_error_defers_to_dequeue() {
        assert!(readiness(libc::POLLERR).unwrap());
        assert!(readiness(libc::POLLIN).unwrap());
        assert!(!readiness(libc::POLLPRI).unwrap());
    }
}
