// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the frame decoders

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use uvc2gl::errors::DecodeError;
use uvc2gl::media::decoders::MjpegDecoder;
use uvc2gl::{CaptureFormat, FrameDecoder, PixelEncoding};

fn encode_jpeg(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 95)
        .encode(rgb, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    jpeg
}

fn format(width: u32, height: u32, encoding: PixelEncoding) -> CaptureFormat {
    CaptureFormat {
        width,
        height,
        fps: 30,
        encoding,
    }
}

#[test]
fn test_mjpeg_decodes_to_rgb() {
    let rgb: Vec<u8> = (0..16 * 8).flat_map(|_| [200u8, 40, 40]).collect();
    let jpeg = encode_jpeg(16, 8, &rgb);

    let mut decoder = FrameDecoder::for_format(&format(16, 8, PixelEncoding::Mjpeg));
    let mut out = Vec::new();
    assert_eq!(decoder.decode(&jpeg, &mut out), Ok((16, 8)));
    assert_eq!(out.len(), 16 * 8 * 3);

    // Lossy, but a flat color survives closely
    let [r, g, b] = [out[0], out[1], out[2]];
    assert!(r > 180 && g < 70 && b < 70, "got {:?}", (r, g, b));
}

#[test]
fn test_mjpeg_reports_stream_dimensions() {
    // The stream's own size wins over the negotiated one
    let jpeg = encode_jpeg(8, 8, &[128; 8 * 8 * 3]);
    let mut decoder = FrameDecoder::for_format(&format(1920, 1080, PixelEncoding::Mjpeg));
    let mut out = Vec::new();
    assert_eq!(decoder.decode(&jpeg, &mut out), Ok((8, 8)));
}

#[test]
fn test_mjpeg_rejects_bad_markers_without_touching_output() {
    let mut decoder = MjpegDecoder::new();
    let mut out = vec![9u8; 3];

    assert_eq!(
        decoder.decode(&[0x00, 0x00, 0xFF, 0xD9], &mut out),
        Err(DecodeError::MissingStartMarker)
    );
    assert_eq!(
        decoder.decode(&[0xFF, 0xD8, 0x00, 0x00], &mut out),
        Err(DecodeError::MissingEndMarker)
    );
    assert_eq!(decoder.decode(&[0xFF, 0xD8], &mut out), Err(DecodeError::Truncated(2)));
    assert_eq!(out, vec![9u8; 3]);
}

#[test]
fn test_mjpeg_rejects_corrupt_frame_size() {
    let mut jpeg = encode_jpeg(8, 8, &[90; 8 * 8 * 3]);
    let sof = jpeg
        .windows(2)
        .position(|w| w == [0xFF, 0xC0])
        .expect("baseline SOF0 segment");
    // Claim 65520x65520, about 12.9 GB of RGB
    jpeg[sof + 5..sof + 9].copy_from_slice(&[0xFF, 0xF0, 0xFF, 0xF0]);

    let mut decoder = FrameDecoder::for_format(&format(8, 8, PixelEncoding::Mjpeg));
    let mut out = vec![3u8; 6];
    assert_eq!(
        decoder.decode(&jpeg, &mut out),
        Err(DecodeError::InvalidDimensions {
            width: 0xFFF0,
            height: 0xFFF0
        })
    );
    assert_eq!(out, vec![3u8; 6]);
}

#[test]
fn test_mjpeg_converter_memoized() {
    let small = encode_jpeg(8, 8, &[64; 8 * 8 * 3]);
    let large = encode_jpeg(16, 16, &[64; 16 * 16 * 3]);
    let mut decoder = MjpegDecoder::new();
    let mut out = Vec::new();

    decoder.decode(&small, &mut out).unwrap();
    decoder.decode(&small, &mut out).unwrap();
    assert_eq!(decoder.converter_rebuilds(), 1);

    decoder.decode(&large, &mut out).unwrap();
    assert_eq!(decoder.converter_rebuilds(), 2);
}

#[test]
fn test_yuyv_gray_then_bright() {
    let data = [128, 128, 128, 128, 255, 128, 255, 128];
    let mut decoder = FrameDecoder::for_format(&format(2, 2, PixelEncoding::Yuyv));
    let mut out = Vec::new();
    assert_eq!(decoder.decode(&data, &mut out), Ok((2, 2)));
    assert_eq!(out.len(), 12);

    let (top, bottom) = out.split_at(6);
    for (dark, bright) in top.iter().zip(bottom) {
        assert!(dark < bright, "{} should be below {}", dark, bright);
    }
}

#[test]
fn test_yuyv_short_input() {
    let mut decoder = FrameDecoder::for_format(&format(4, 4, PixelEncoding::Yuyv));
    let mut out = Vec::new();
    assert_eq!(
        decoder.decode(&[0; 10], &mut out),
        Err(DecodeError::ShortInput {
            expected: 32,
            actual: 10
        })
    );
}
