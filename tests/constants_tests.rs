// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use uvc2gl::constants::{audio, video};

#[test]
fn test_buffer_defaults_are_usable() {
    assert!(video::DEFAULT_BUFFER_COUNT >= video::MIN_BUFFER_COUNT);
    assert!(video::MIN_BUFFER_COUNT >= 2);
    assert!(video::DEFAULT_RING_CAPACITY > 0);
    assert!(video::MAX_FRAME_DIMENSION >= 3840);
    assert!(video::MAX_DECODE_ALLOC >= video::MAX_FRAME_DIMENSION as u64 * video::MAX_FRAME_DIMENSION as u64 * 3);
}

#[test]
fn test_jpeg_markers() {
    assert_eq!(video::JPEG_SOI, [0xFF, 0xD8]);
    assert_eq!(video::JPEG_EOI, [0xFF, 0xD9]);
}

#[test]
fn test_ready_timeout_is_bounded() {
    // Stop waits for at most one readiness wait
    assert!(video::READY_TIMEOUT.as_secs() <= 2);
    assert!(!video::READY_TIMEOUT.is_zero());
    assert!(!video::ERROR_BACKOFF.is_zero());
    assert!(video::ERROR_BACKOFF <= video::MAX_ERROR_BACKOFF);
    assert!(video::MAX_ERROR_BACKOFF < video::READY_TIMEOUT);
}

#[test]
fn test_audio_defaults() {
    assert_eq!(audio::DEFAULT_SAMPLE_RATE, 48_000);
    assert_eq!(audio::DEFAULT_CHANNELS, 2);
    assert!(audio::VOLUME_STEP > 0.0 && audio::VOLUME_STEP < 1.0);
}
