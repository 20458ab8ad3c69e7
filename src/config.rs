// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in `<config dir>/uvc2gl/config.json`. Missing fields take
//! their defaults, so older files keep loading as options are added.

use crate::constants::{APP_DIR_NAME, CONFIG_FILE_NAME, audio, video};
use crate::errors::ConfigError;
use crate::media::formats::PixelEncoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video device path; empty picks the first capture device
    pub video_device: String,
    /// ALSA capture device id; empty uses the capture-card heuristic
    pub audio_device: String,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Requested frame rate
    pub fps: u32,
    /// Pixel encoding to negotiate (mjpeg or yuyv)
    pub encoding: PixelEncoding,
    /// Driver buffers per video session
    pub buffer_count: u32,
    /// Frames discarded after stream-on; None means one second's worth
    pub warmup_frames: Option<u32>,
    /// Slots in the frame handoff buffer
    pub ring_capacity: usize,
    /// Requested audio sample rate
    pub sample_rate: u32,
    /// Requested audio channel count
    pub channels: u32,
    /// Frames per ALSA period
    pub period_size: usize,
    /// Playback volume in [0, 1]
    pub volume: f32,
    /// Whether the viewer plays captured audio
    pub audio_enabled: bool,
    /// Description fragments identifying a capture card's audio input
    pub audio_fallback_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_device: video::DEFAULT_DEVICE.to_string(),
            audio_device: String::new(),
            width: video::DEFAULT_WIDTH,
            height: video::DEFAULT_HEIGHT,
            fps: video::DEFAULT_FPS,
            encoding: PixelEncoding::default(),
            buffer_count: video::DEFAULT_BUFFER_COUNT,
            warmup_frames: None,
            ring_capacity: video::DEFAULT_RING_CAPACITY,
            sample_rate: audio::DEFAULT_SAMPLE_RATE,
            channels: audio::DEFAULT_CHANNELS,
            period_size: audio::DEFAULT_PERIOD_SIZE,
            volume: 1.0,
            audio_enabled: true,
            audio_fallback_patterns: audio::DEFAULT_FALLBACK_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::default_path() {
            Ok(path) => Self::load_or_default(&path),
            Err(e) => {
                warn!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Load from `path`; a missing or unreadable file yields defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }
        }
    }

    /// Strictly load from `path`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&text)?;
        config.sanitize();
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Pull out-of-range values back to something usable
    pub fn sanitize(&mut self) {
        self.volume = if self.volume.is_nan() {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        };
        self.buffer_count = self.buffer_count.max(video::MIN_BUFFER_COUNT);
        self.ring_capacity = self.ring_capacity.max(1);
        if self.fps == 0 {
            self.fps = video::DEFAULT_FPS;
        }
        if self.channels == 0 {
            self.channels = audio::DEFAULT_CHANNELS;
        }
        if self.sample_rate == 0 {
            self.sample_rate = audio::DEFAULT_SAMPLE_RATE;
        }
        if self.period_size == 0 {
            self.period_size = audio::DEFAULT_PERIOD_SIZE;
        }
    }

    /// Configured ALSA device, if one is set
    pub fn audio_device(&self) -> Option<&str> {
        Some(self.audio_device.as_str()).filter(|d| !d.is_empty())
    }
}
