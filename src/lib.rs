// SPDX-License-Identifier: MPL-2.0

//! uvc2gl - capture core for USB video-class capture cards
//!
//! Pulls video frames from a V4L2 device and audio from an ALSA capture
//! device, decodes video to packed RGB, and hands the newest frame to a
//! render loop without ever blocking it. Captured audio can be played back
//! through the default output device.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Video and audio capture sources, audio playback sink
//! - [`media`]: Pixel encodings and frame decoders
//! - [`config`]: User configuration handling
//! - [`terminal`]: Terminal viewer that consumes the capture core
//!
//! # Example
//!
//! ```no_run
//! use uvc2gl::{PixelEncoding, VideoCapture};
//!
//! let mut capture = VideoCapture::new("/dev/video0", 1920, 1080, 30, PixelEncoding::Mjpeg, 10);
//! capture.start()?;
//! if let Some(frame) = capture.get_frame() {
//!     println!("{}x{} frame", frame.width, frame.height);
//! }
//! capture.stop();
//! # Ok::<(), uvc2gl::errors::CaptureError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod terminal;

// Re-export commonly used types
pub use backends::audio::{AudioCapture, AudioDeviceInfo, AudioFrame, AudioPlayback, PlaybackHandle};
pub use backends::camera::{CaptureFormat, CaptureStats, VideoCapture, VideoDeviceInfo, VideoFrame};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use media::{FrameDecoder, PixelEncoding};
