// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Video capture defaults
pub mod video {
    use super::Duration;

    /// Device opened when neither the config nor the CLI names one
    pub const DEFAULT_DEVICE: &str = "/dev/video0";

    /// Default capture resolution
    pub const DEFAULT_WIDTH: u32 = 1920;
    pub const DEFAULT_HEIGHT: u32 = 1080;
    pub const DEFAULT_FPS: u32 = 30;

    /// Number of driver buffers requested per session
    pub const DEFAULT_BUFFER_COUNT: u32 = 4;

    /// Fewer than two buffers leaves the driver nothing to fill while we read
    pub const MIN_BUFFER_COUNT: u32 = 2;

    /// Slots in the frame handoff buffer
    pub const DEFAULT_RING_CAPACITY: usize = 10;

    /// Upper bound on one readiness wait before the loop rechecks its running flag
    pub const READY_TIMEOUT: Duration = Duration::from_secs(2);

    /// First pause after a failed wait or dequeue; doubles while errors repeat
    pub const ERROR_BACKOFF: Duration = Duration::from_millis(10);

    /// Longest pause between retries of a failing device
    pub const MAX_ERROR_BACKOFF: Duration = Duration::from_millis(500);

    /// Largest width or height a decoded frame may claim
    ///
    /// Covers 8K sensors; anything above is a corrupt header.
    pub const MAX_FRAME_DIMENSION: u32 = 8192;

    /// Upper bound on decoder allocations for one frame
    pub const MAX_DECODE_ALLOC: u64 = MAX_FRAME_DIMENSION as u64 * MAX_FRAME_DIMENSION as u64 * 4;

    /// JPEG start-of-image marker
    pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

    /// JPEG end-of-image marker
    pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
}

/// Audio capture and playback defaults
pub mod audio {
    /// ALSA device used when nothing else is configured
    pub const DEFAULT_CAPTURE_DEVICE: &str = "default";

    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
    pub const DEFAULT_CHANNELS: u32 = 2;

    /// Frames per ALSA period
    pub const DEFAULT_PERIOD_SIZE: usize = 1024;

    /// Seconds of audio the playback ring can hold
    pub const PLAYBACK_BUFFER_SECONDS: usize = 2;

    /// Frames per output callback requested from the audio host
    pub const OUTPUT_BUFFER_FRAMES: u32 = 1024;

    /// Description fragments that usually identify a capture card's audio input
    pub const DEFAULT_FALLBACK_PATTERNS: &[&str] = &["USB", "Video", "Capture"];

    /// Playback volume step for the viewer's +/- keys
    pub const VOLUME_STEP: f32 = 0.05;
}

/// Terminal viewer timings
pub mod viewer {
    use super::Duration;

    /// Input poll interval; also caps the redraw rate
    pub const POLL_INTERVAL: Duration = Duration::from_millis(16);

    /// How often the passthrough pump moves captured audio to playback
    pub const AUDIO_PUMP_INTERVAL: Duration = Duration::from_millis(5);
}

/// Name of the directory created under the user config dir
pub const APP_DIR_NAME: &str = "uvc2gl";

/// Config file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// How often the `monitor` command checks for Ctrl+C or its deadline
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
