// SPDX-License-Identifier: MPL-2.0

//! Audio capture, playback and device enumeration
//!
//! - [`capture`]: ALSA capture thread publishing through a double buffer
//! - [`playback`]: circular buffer drained by the platform output callback
//! - [`passthrough`]: pump thread moving captured periods to playback

pub mod capture;
pub mod passthrough;
pub mod playback;

pub use capture::{AlsaSource, AudioCapture, AudioFrame, DoubleBuffer, PcmParams, PcmReadError, PcmSource};
pub use passthrough::{AudioPassthrough, pump_once, spawn_pump};
pub use playback::{AudioPlayback, PlaybackBuffer, PlaybackHandle};

use alsa::Direction;
use alsa::device_name::HintIter;
use tracing::{debug, warn};

use crate::constants::audio::DEFAULT_CAPTURE_DEVICE;

/// Represents an audio input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    /// ALSA PCM name passed to `snd_pcm_open` (e.g. `hw:1,0`, `default`)
    pub id: String,
    /// Human-readable description
    pub description: String,
}

/// Enumerate ALSA PCM devices that can capture
///
/// Always contains `default`, listed first.
pub fn list_audio_devices() -> Vec<AudioDeviceInfo> {
    let mut devices = Vec::new();

    match HintIter::new_str(None, "pcm") {
        Ok(hints) => {
            for hint in hints {
                // No direction means the device does both
                if matches!(hint.direction, Some(Direction::Playback)) {
                    continue;
                }
                let Some(id) = hint.name else { continue };
                if id == "null" {
                    continue;
                }
                let description = hint
                    .desc
                    .map(|d| d.lines().map(str::trim).collect::<Vec<_>>().join(" - "))
                    .unwrap_or_else(|| id.clone());

                debug!(id = %id, description = %description, "Found audio capture device");
                devices.push(AudioDeviceInfo { id, description });
            }
        }
        Err(e) => warn!(error = %e, "Failed to enumerate ALSA devices"),
    }

    ensure_default(&mut devices);
    devices
}

/// Put `default` at the front, adding it when ALSA did not list it
fn ensure_default(devices: &mut Vec<AudioDeviceInfo>) {
    match devices.iter().position(|d| d.id == DEFAULT_CAPTURE_DEVICE) {
        Some(0) => {}
        Some(index) => {
            let default = devices.remove(index);
            devices.insert(0, default);
        }
        None => devices.insert(
            0,
            AudioDeviceInfo {
                id: DEFAULT_CAPTURE_DEVICE.to_string(),
                description: "Default Audio Device".to_string(),
            },
        ),
    }
}

/// First device whose description contains any of `patterns`
///
/// Matching is a case-insensitive substring test, tried pattern by pattern
/// so earlier patterns take priority.
pub fn select_audio_device<'a, S: AsRef<str>>(
    devices: &'a [AudioDeviceInfo],
    patterns: &[S],
) -> Option<&'a AudioDeviceInfo> {
    patterns.iter().find_map(|pattern| {
        let needle = pattern.as_ref().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        devices
            .iter()
            .find(|d| d.description.to_lowercase().contains(&needle))
    })
}

/// Pick the capture device id for a session
///
/// A configured id wins when ALSA lists it. Otherwise the capture-card
/// heuristic runs, and `default` is the last resort.
pub fn resolve_capture_device<S: AsRef<str>>(
    configured: Option<&str>,
    devices: &[AudioDeviceInfo],
    patterns: &[S],
) -> String {
    if let Some(id) = configured.filter(|id| !id.is_empty()) {
        if devices.iter().any(|d| d.id == id) {
            return id.to_string();
        }
        warn!(device = %id, "Configured audio device not found, falling back");
    }

    match select_audio_device(devices, patterns) {
        Some(device) => {
            debug!(device = %device.id, description = %device.description, "Selected capture-card audio");
            device.id.clone()
        }
        None => DEFAULT_CAPTURE_DEVICE.to_string(),
    }
}
