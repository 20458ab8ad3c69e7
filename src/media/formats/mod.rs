// SPDX-License-Identifier: MPL-2.0

//! Format and codec utilities
//!
//! This module provides the pixel encodings a session can negotiate and the
//! CPU conversions from those encodings to RGB24.

pub mod codec;
pub mod conversions;

pub use codec::PixelEncoding;
