// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the frame handoff buffer

use std::sync::Arc;
use std::thread;

use uvc2gl::backends::camera::FrameRing;

#[test]
fn test_empty_ring_returns_none() {
    let ring: FrameRing<u32> = FrameRing::new(4);
    assert!(ring.pop().is_none());
    assert!(!ring.has_unread());
}

#[test]
fn test_latest_wins() {
    let ring = FrameRing::new(4);
    for value in 1..=3 {
        ring.push(value);
    }
    assert_eq!(ring.pop(), Some(3));
    // Older unread items are never delivered
    assert_eq!(ring.pop(), None);
}

#[test]
fn test_wraps_past_capacity() {
    let ring = FrameRing::new(2);
    for value in 0..5 {
        ring.push(value);
        assert_eq!(ring.pop(), Some(value));
    }
}

#[test]
fn test_zero_capacity_is_promoted() {
    let ring = FrameRing::new(0);
    assert_eq!(ring.capacity(), 1);
    ring.push("frame");
    assert_eq!(ring.pop(), Some("frame"));
}

#[test]
fn test_reader_never_sees_older_frame() {
    let ring = Arc::new(FrameRing::new(3));
    let writer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for value in 0..10_000u32 {
                ring.push(value);
            }
        })
    };

    let mut last = None;
    while !writer.is_finished() || ring.has_unread() {
        if let Some(value) = ring.pop() {
            if let Some(previous) = last {
                assert!(value > previous, "{} delivered after {}", value, previous);
            }
            last = Some(value);
        }
    }
    writer.join().unwrap();
    assert_eq!(last, Some(9_999));
}
