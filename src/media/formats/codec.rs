// SPDX-License-Identifier: GPL-3.0-only

//! Pixel encodings a capture session can negotiate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel encodings the frame decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelEncoding {
    /// Motion JPEG - each buffer is one complete JPEG image
    #[default]
    Mjpeg,
    /// YUYV 4:2:2 - packed Y0 U Y1 V, 2 bytes per pixel
    Yuyv,
}

impl PixelEncoding {
    pub const ALL: [PixelEncoding; 2] = [PixelEncoding::Mjpeg, PixelEncoding::Yuyv];

    /// Parse from a V4L2 FourCC string
    pub fn from_fourcc(fourcc: &str) -> Option<Self> {
        match fourcc.trim().to_uppercase().as_str() {
            "MJPG" | "JPEG" => Some(Self::Mjpeg),
            "YUYV" | "YUY2" => Some(Self::Yuyv),
            _ => None,
        }
    }

    /// V4L2 FourCC code for this encoding
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            Self::Mjpeg => b"MJPG",
            Self::Yuyv => b"YUYV",
        }
    }

    /// Compressed encodings produce variable-size buffers
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Mjpeg)
    }

    /// Exact buffer size a driver should fill for one frame, when known
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        match self {
            Self::Mjpeg => None,
            Self::Yuyv => Some(width as usize * height as usize * 2),
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mjpeg => write!(f, "MJPEG"),
            Self::Yuyv => write!(f, "YUYV"),
        }
    }
}

impl FromStr for PixelEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mjpeg" | "mjpg" | "jpeg" => Ok(Self::Mjpeg),
            "yuyv" | "yuy2" => Ok(Self::Yuyv),
            other => Err(format!("unknown pixel encoding '{}'", other)),
        }
    }
}
