// SPDX-License-Identifier: GPL-3.0-only

//! Frame decoders
//!
//! One decoder lives on each capture thread and is fixed for the session's
//! negotiated [`CaptureFormat`]. Both paths write packed RGB24.

mod mjpeg;

pub use mjpeg::{MjpegDecoder, validate_markers};

use crate::backends::camera::CaptureFormat;
use crate::errors::DecodeError;
use crate::media::formats::PixelEncoding;
use crate::media::formats::conversions::yuyv_to_rgb;

/// Decoder selected by the negotiated pixel encoding
#[derive(Debug)]
pub enum FrameDecoder {
    /// Stateful JPEG decode; dimensions come from the image itself
    Mjpeg(MjpegDecoder),
    /// Stateless packed conversion at the negotiated size
    Yuyv { width: u32, height: u32 },
}

impl FrameDecoder {
    pub fn for_format(format: &CaptureFormat) -> Self {
        match format.encoding {
            PixelEncoding::Mjpeg => Self::Mjpeg(MjpegDecoder::new()),
            PixelEncoding::Yuyv => Self::Yuyv {
                width: format.width,
                height: format.height,
            },
        }
    }

    /// Decode one buffer into `out`, returning the picture dimensions
    ///
    /// `out` is untouched when an error is returned.
    pub fn decode(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<(u32, u32), DecodeError> {
        match self {
            Self::Mjpeg(decoder) => decoder.decode(data, out),
            Self::Yuyv { width, height } => {
                yuyv_to_rgb(data, *width, *height, out)?;
                Ok((*width, *height))
            }
        }
    }

    pub fn encoding(&self) -> PixelEncoding {
        match self {
            Self::Mjpeg(_) => PixelEncoding::Mjpeg,
            Self::Yuyv { .. } => PixelEncoding::Yuyv,
        }
    }
}
