// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device and format enumeration
//!
//! Stateless queries used at startup and when switching devices. Nothing
//! here touches a running capture session.

use super::types::{PixelEncoding, VideoDeviceInfo, VideoFormat};
use std::os::unix::io::{AsRawFd, RawFd};
use crate::constants::video::DEFAULT_DEVICE;
use tracing::{debug, warn};
use v4l::prelude::*;
use v4l::FourCC;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::video::Capture;

/// VIDIOC_QUERYCAP ioctl number
const VIDIOC_QUERYCAP: libc::c_ulong = 0x80685600;

/// V4L2 capability flag for single-planar video capture
const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x00000001;

/// Set when `device_caps` is filled in
const V4L2_CAP_DEVICE_CAPS: u32 = 0x80000000;

/// Frame rate reported when the driver gives no usable interval
const FALLBACK_FPS: u32 = 30;

/// Resolutions tried inside stepwise/continuous frame size ranges
const STEPWISE_PROBE_SIZES: [(u32, u32); 4] = [(1920, 1080), (1280, 720), (640, 480), (320, 240)];

/// V4L2 capability structure for VIDIOC_QUERYCAP ioctl
#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

impl V4l2Capability {
    /// Capabilities of this node rather than the whole physical device
    fn node_caps(&self) -> u32 {
        if self.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
            self.device_caps
        } else {
            self.capabilities
        }
    }
}

/// Query V4L2 capabilities for an open file descriptor.
///
/// Issues the `VIDIOC_QUERYCAP` ioctl and returns the capability struct,
/// or `None` if the ioctl fails.
fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

/// NUL-terminated fixed-size C string to String
fn c_field(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim().to_string()
}

/// Probe one device node; `None` unless it is a video capture node
pub fn inspect_video_device(path: &str) -> Option<VideoDeviceInfo> {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;

    if cap.node_caps() & V4L2_CAP_VIDEO_CAPTURE == 0 {
        debug!(path, "Skipping non-capture V4L2 node");
        return None;
    }

    let info = VideoDeviceInfo {
        path: path.to_string(),
        name: c_field(&cap.card),
        driver: c_field(&cap.driver),
    };
    debug!(path, name = %info.name, driver = %info.driver, "Found video capture device");
    Some(info)
}

/// Sort key for `/dev/videoN` so video10 comes after video2
fn video_node_number(path: &str) -> u32 {
    path.trim_start_matches("/dev/video")
        .parse()
        .unwrap_or(u32::MAX)
}

/// List video capture devices under /dev
///
/// Metadata and output nodes are filtered out. An unreadable /dev yields
/// an empty list.
pub fn list_video_devices() -> Vec<VideoDeviceInfo> {
    let entries = match std::fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "Cannot read /dev");
            return Vec::new();
        }
    };

    let mut paths: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with("video").then(|| format!("/dev/{}", name))
        })
        .collect();
    paths.sort_by_key(|p| video_node_number(p));

    paths.iter().filter_map(|p| inspect_video_device(p)).collect()
}

/// Pick the video device for a session
///
/// The configured path wins when it is one of `devices`; otherwise the
/// first enumerated capture device is used. With nothing enumerated the
/// configured path is tried anyway so the open error names it.
pub fn resolve_video_device(configured: &str, devices: &[VideoDeviceInfo]) -> String {
    if !configured.is_empty() && devices.iter().any(|d| d.path == configured) {
        return configured.to_string();
    }
    match devices.first() {
        Some(first) => {
            if !configured.is_empty() {
                warn!(device = %configured, fallback = %first.path, "Configured video device not found");
            }
            first.path.clone()
        }
        None if configured.is_empty() => DEFAULT_DEVICE.to_string(),
        None => configured.to_string(),
    }
}

/// Formats a device offers for MJPEG capture
pub fn query_formats(device_path: &str) -> Vec<VideoFormat> {
    query_formats_for(device_path, PixelEncoding::Mjpeg)
}

/// Formats a device offers for one pixel encoding
///
/// Sorted by resolution then frame rate, largest first, without duplicates.
pub fn query_formats_for(device_path: &str, encoding: PixelEncoding) -> Vec<VideoFormat> {
    let dev = match Device::with_path(device_path) {
        Ok(d) => d,
        Err(e) => {
            debug!(device = %device_path, error = %e, "Cannot open device for format query");
            return Vec::new();
        }
    };
    let fourcc = FourCC::new(encoding.fourcc());

    let sizes = match dev.enum_framesizes(fourcc) {
        Ok(sizes) => sizes,
        Err(e) => {
            debug!(device = %device_path, %encoding, error = %e, "No frame sizes");
            return Vec::new();
        }
    };

    let mut formats = Vec::new();
    for size in sizes {
        match size.size {
            FrameSizeEnum::Discrete(discrete) => {
                for fps in frame_rates(&dev, fourcc, discrete.width, discrete.height) {
                    formats.push(VideoFormat {
                        width: discrete.width,
                        height: discrete.height,
                        fps,
                    });
                }
            }
            FrameSizeEnum::Stepwise(step) => {
                for (w, h) in STEPWISE_PROBE_SIZES {
                    if w >= step.min_width
                        && w <= step.max_width
                        && h >= step.min_height
                        && h <= step.max_height
                    {
                        for fps in frame_rates(&dev, fourcc, w, h) {
                            formats.push(VideoFormat {
                                width: w,
                                height: h,
                                fps,
                            });
                        }
                    }
                }
            }
        }
    }

    sort_formats(&mut formats);
    debug!(device = %device_path, %encoding, count = formats.len(), "Queried formats");
    formats
}

fn frame_rates(dev: &Device, fourcc: FourCC, width: u32, height: u32) -> Vec<u32> {
    let intervals = match dev.enum_frameintervals(fourcc, width, height) {
        Ok(intervals) => intervals,
        Err(_) => return vec![FALLBACK_FPS],
    };

    let mut rates: Vec<u32> = intervals
        .into_iter()
        .map(|interval| match interval.interval {
            FrameIntervalEnum::Discrete(frac) if frac.numerator > 0 => {
                frac.denominator / frac.numerator
            }
            FrameIntervalEnum::Stepwise(step) if step.min.numerator > 0 => {
                // Fastest rate in the range
                step.min.denominator / step.min.numerator
            }
            _ => FALLBACK_FPS,
        })
        .filter(|&fps| fps > 0)
        .collect();

    if rates.is_empty() {
        rates.push(FALLBACK_FPS);
    }
    rates
}

/// Largest resolution first, then highest frame rate; duplicates removed
pub fn sort_formats(formats: &mut Vec<VideoFormat>) {
    formats.sort_by(|a, b| {
        (b.width * b.height, b.fps).cmp(&(a.width * a.height, a.fps))
            .then(b.width.cmp(&a.width))
    });
    formats.dedup();
}
