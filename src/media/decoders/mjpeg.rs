// SPDX-License-Identifier: GPL-3.0-only

//! MJPEG frame decoder
//!
//! Each V4L2 MJPEG buffer carries one complete JPEG image. Spans are checked
//! for the SOI/EOI markers before the codec sees them, because UVC devices
//! regularly hand back truncated buffers when USB bandwidth runs short.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder, Limits};
use tracing::debug;

use crate::constants::video::{JPEG_EOI, JPEG_SOI, MAX_DECODE_ALLOC, MAX_FRAME_DIMENSION};
use crate::errors::DecodeError;
use crate::media::formats::conversions::{gray_alpha_to_rgb, gray_to_rgb, rgba_to_rgb};

/// Check that a span looks like a whole JPEG image
pub fn validate_markers(data: &[u8]) -> Result<(), DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::Truncated(data.len()));
    }
    if data[..2] != JPEG_SOI {
        return Err(DecodeError::MissingStartMarker);
    }
    if data[data.len() - 2..] != JPEG_EOI {
        return Err(DecodeError::MissingEndMarker);
    }
    Ok(())
}

/// The header is untrusted: a flipped bit in SOF can claim gigabytes
fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_FRAME_DIMENSION);
    limits.max_image_height = Some(MAX_FRAME_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Identity of a decoded picture layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConverterKey {
    width: u32,
    height: u32,
    color: ColorType,
}

#[derive(Debug, Clone, Copy)]
enum Conversion {
    Passthrough,
    Gray,
    GrayAlpha,
    DropAlpha,
}

/// RGB converter bound to one picture layout
#[derive(Debug)]
struct RgbConverter {
    key: ConverterKey,
    conversion: Conversion,
}

impl RgbConverter {
    fn new(key: ConverterKey) -> Result<Self, DecodeError> {
        let conversion = match key.color {
            ColorType::Rgb8 => Conversion::Passthrough,
            ColorType::L8 => Conversion::Gray,
            ColorType::La8 => Conversion::GrayAlpha,
            ColorType::Rgba8 => Conversion::DropAlpha,
            other => return Err(DecodeError::UnsupportedColor(format!("{:?}", other))),
        };
        Ok(Self { key, conversion })
    }

    fn convert(&self, src: &[u8], out: &mut Vec<u8>) {
        match self.conversion {
            Conversion::Passthrough => {
                out.clear();
                out.extend_from_slice(src);
            }
            Conversion::Gray => gray_to_rgb(src, out),
            Conversion::GrayAlpha => gray_alpha_to_rgb(src, out),
            Conversion::DropAlpha => rgba_to_rgb(src, out),
        }
    }
}

/// Stateful MJPEG to RGB24 decoder
///
/// Keeps the decode scratch buffer and the RGB converter across frames. The
/// converter is rebuilt only when the decoded width, height or color type
/// changes, so a stable device costs no setup per frame.
#[derive(Debug, Default)]
pub struct MjpegDecoder {
    scratch: Vec<u8>,
    converter: Option<RgbConverter>,
    converter_rebuilds: u64,
}

impl MjpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one JPEG span into `out` as RGB24
    ///
    /// Returns the picture dimensions. `out` is only written on success.
    pub fn decode(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<(u32, u32), DecodeError> {
        validate_markers(data)?;

        let mut decoder = JpegDecoder::new(Cursor::new(data))?;
        let (width, height) = decoder.dimensions();
        if width == 0
            || height == 0
            || width > MAX_FRAME_DIMENSION
            || height > MAX_FRAME_DIMENSION
        {
            return Err(DecodeError::InvalidDimensions { width, height });
        }
        decoder.set_limits(decode_limits())?;

        let key = ConverterKey {
            width,
            height,
            color: decoder.color_type(),
        };

        let total = usize::try_from(decoder.total_bytes())
            .map_err(|_| DecodeError::InvalidDimensions { width, height })?;
        self.scratch.resize(total, 0);
        decoder.read_image(&mut self.scratch)?;

        if self.converter.as_ref().is_none_or(|c| c.key != key) {
            let converter = RgbConverter::new(key)?;
            debug!(
                width,
                height,
                color = ?key.color,
                "Rebuilding MJPEG color converter"
            );
            self.converter = Some(converter);
            self.converter_rebuilds += 1;
        }

        if let Some(converter) = &self.converter {
            converter.convert(&self.scratch, out);
        }

        Ok((width, height))
    }

    /// How many times the color converter has been (re)built
    pub fn converter_rebuilds(&self) -> u64 {
        self.converter_rebuilds
    }
}
