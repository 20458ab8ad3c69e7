// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the playback buffer

use uvc2gl::backends::audio::{AudioPlayback, PlaybackBuffer};

#[test]
fn test_overflow_drops_oldest() {
    let mut buffer = PlaybackBuffer::new(3);
    buffer.push(&[10, 20, 30, 40]);

    let mut out = [0i16; 4];
    buffer.fill(&mut out);
    assert_eq!(out, [20, 30, 40, 0]);
}

#[test]
fn test_interleaved_push_and_drain() {
    let mut buffer = PlaybackBuffer::new(4);
    let mut out = [0i16; 2];

    buffer.push(&[1, 2, 3]);
    buffer.fill(&mut out);
    assert_eq!(out, [1, 2]);

    buffer.push(&[4, 5, 6]);
    let mut out = [0i16; 5];
    buffer.fill(&mut out);
    assert_eq!(out, [3, 4, 5, 6, 0]);
}

#[test]
fn test_mute_produces_silence() {
    let mut buffer = PlaybackBuffer::new(4);
    buffer.set_volume(0.0);
    buffer.push(&[i16::MAX, i16::MIN]);
    assert_eq!(buffer.next_sample(), 0);
    assert_eq!(buffer.next_sample(), 0);
}

#[test]
fn test_volume_round_trips_through_sink() {
    let playback = AudioPlayback::new(48_000, 2);
    playback.set_volume(0.4);
    assert!((playback.volume() - 0.4).abs() < f32::EPSILON);
    playback.set_volume(-3.0);
    assert_eq!(playback.volume(), 0.0);
}

#[test]
fn test_stop_discards_queued_audio() {
    let mut playback = AudioPlayback::new(48_000, 2);
    playback.queue_audio(&[5; 8], 4);
    assert_eq!(playback.handle().queued(), 8);

    playback.stop();
    assert_eq!(playback.handle().queued(), 0);
    assert!(!playback.is_running());
}

#[test]
fn test_cleared_buffer_plays_silence() {
    let mut buffer = PlaybackBuffer::new(4);
    buffer.push(&[9, 9, 9]);
    buffer.clear();
    assert!(buffer.is_empty());

    let mut out = [1i16; 2];
    buffer.fill(&mut out);
    assert_eq!(out, [0, 0]);
}

#[test]
fn test_handle_is_send() {
    fn assert_send<T: Send + Sync>() {}
    assert_send::<uvc2gl::PlaybackHandle>();
}
