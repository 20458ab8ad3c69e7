// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture core

use std::fmt;

use crate::backends::camera::frame_loop::LoopSpawnError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Video capture errors
    Capture(CaptureError),
    /// Audio capture or playback errors
    Audio(AudioError),
    /// Configuration errors
    Config(ConfigError),
    /// Generic error with message
    Other(String),
}

/// Session-fatal video capture errors
///
/// Every variant is raised while a session is being set up; once streaming,
/// the acquisition loop only logs.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// Device node could not be opened
    OpenFailed { device: String, reason: String },
    /// The driver refused the requested format or returned an unusable one
    FormatNegotiation(String),
    /// Buffer request (REQBUFS/QUERYBUF) failed or returned too few buffers
    BufferRequest(String),
    /// Mapping a driver buffer into process memory failed
    BufferMapping { index: usize, reason: String },
    /// Queueing buffers or turning the stream on failed
    StreamStart(String),
    /// The capture thread could not be spawned
    ThreadSpawn(String),
}

/// Audio capture and playback errors
#[derive(Debug, Clone)]
pub enum AudioError {
    /// PCM device could not be opened
    OpenFailed { device: String, reason: String },
    /// Hardware parameter negotiation failed
    Negotiation(String),
    /// No output device is available
    NoOutputDevice,
    /// Output stream could not be built or controlled
    Stream(String),
    /// The capture thread could not be spawned
    ThreadSpawn(String),
}

/// Frame decode failures
///
/// These are per-unit: the frame is dropped and the loop moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Compressed span too short to hold start and end markers
    Truncated(usize),
    /// Missing JPEG start-of-image marker
    MissingStartMarker,
    /// Missing JPEG end-of-image marker
    MissingEndMarker,
    /// Width or height of zero
    InvalidDimensions { width: u32, height: u32 },
    /// Packed input shorter than width * height * 2
    ShortInput { expected: usize, actual: usize },
    /// Decoded picture uses a color layout with no RGB conversion
    UnsupportedColor(String),
    /// The codec rejected the data
    Codec(String),
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// No per-user configuration directory could be determined
    NoConfigDir,
    /// Reading or writing the config file failed
    Io(String),
    /// The config file is not valid JSON for this schema
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Video capture error: {}", e),
            AppError::Audio(e) => write!(f, "Audio error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::OpenFailed { device, reason } => {
                write!(f, "Error opening device {}: {}", device, reason)
            }
            CaptureError::FormatNegotiation(msg) => write!(f, "Error setting format: {}", msg),
            CaptureError::BufferRequest(msg) => write!(f, "Error requesting buffers: {}", msg),
            CaptureError::BufferMapping { index, reason } => {
                write!(f, "Error mapping buffer {}: {}", index, reason)
            }
            CaptureError::StreamStart(msg) => write!(f, "Error starting streaming: {}", msg),
            CaptureError::ThreadSpawn(msg) => write!(f, "Failed to spawn capture thread: {}", msg),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::OpenFailed { device, reason } => {
                write!(f, "Cannot open audio device {}: {}", device, reason)
            }
            AudioError::Negotiation(msg) => write!(f, "Cannot set hardware parameters: {}", msg),
            AudioError::NoOutputDevice => write!(f, "No audio output device available"),
            AudioError::Stream(msg) => write!(f, "Audio stream error: {}", msg),
            AudioError::ThreadSpawn(msg) => write!(f, "Failed to spawn audio thread: {}", msg),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated(len) => write!(f, "Compressed frame too short ({} bytes)", len),
            DecodeError::MissingStartMarker => write!(f, "Missing start-of-image marker"),
            DecodeError::MissingEndMarker => write!(f, "Missing end-of-image marker"),
            DecodeError::InvalidDimensions { width, height } => {
                write!(f, "Invalid frame dimensions {}x{}", width, height)
            }
            DecodeError::ShortInput { expected, actual } => {
                write!(f, "Short input: expected {} bytes, got {}", expected, actual)
            }
            DecodeError::UnsupportedColor(color) => {
                write!(f, "Unsupported decoded color type: {}", color)
            }
            DecodeError::Codec(msg) => write!(f, "Decode failed: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid config file: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for AudioError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for ConfigError {}

// Conversions from sub-errors to AppError
impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        AppError::Audio(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::Codec(err.to_string())
    }
}

impl From<LoopSpawnError> for CaptureError {
    fn from(err: LoopSpawnError) -> Self {
        CaptureError::ThreadSpawn(err.0)
    }
}

impl From<LoopSpawnError> for AudioError {
    fn from(err: LoopSpawnError) -> Self {
        AudioError::ThreadSpawn(err.0)
    }
}

impl From<alsa::Error> for AudioError {
    fn from(err: alsa::Error) -> Self {
        AudioError::Negotiation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_wraps_into_app_error() {
        let err: AppError = CaptureError::FormatNegotiation("EINVAL".into()).into();
        assert!(matches!(err, AppError::Capture(_)));
        assert_eq!(
            err.to_string(),
            "Video capture error: Error setting format: EINVAL"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ShortInput {
            expected: 8,
            actual: 4,
        };
        assert_eq!(err.to_string(), "Short input: expected 8 bytes, got 4");
    }
}
