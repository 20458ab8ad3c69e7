// SPDX-License-Identifier: MPL-2.0

//! Capture and playback backends
//!
//! # Architecture
//!
//! Each source runs its own producer thread and hands results to the
//! consumer without blocking either side:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               Consumer (viewer)               │
//! └───────┬───────────────────┬───────────────────┘
//!         │ get_frame()       │ get_audio_frame() / queue_audio()
//! ┌───────┴────────┐  ┌───────┴───────────────────┐
//! │     Camera     │  │          Audio            │
//! │ V4L2 → decode  │  │ ALSA → double buffer      │
//! │ → FrameRing    │  │ playback ring → cpal      │
//! └────────────────┘  └───────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`audio`]: ALSA capture, cpal playback, device enumeration and selection
//! - [`camera`]: V4L2 capture, frame handoff and device/format enumeration

pub mod audio;
pub mod camera;
