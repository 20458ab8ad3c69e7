// SPDX-License-Identifier: MPL-2.0

//! Media decoding and color conversion
//!
//! Capture buffers arrive as MJPEG or packed YUYV and leave as RGB24:
//!
//! - [`formats`]: pixel encodings and CPU color conversions
//! - [`decoders`]: per-session frame decoders built on top of them

pub mod decoders;
pub mod formats;

pub use decoders::FrameDecoder;
pub use formats::PixelEncoding;
