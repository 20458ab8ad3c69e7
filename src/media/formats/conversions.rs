// SPDX-License-Identifier: MPL-2.0

//! Pixel format conversion to packed RGB24
//!
//! Every path here writes row-major RGB, 3 bytes per pixel, which is what
//! [`VideoFrame`](crate::backends::camera::VideoFrame) carries.

use crate::errors::DecodeError;

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 studio-range YUV to RGB for one luma sample
///
/// `d` and `e` are the chroma offsets (`U - 128`, `V - 128`) shared by both
/// pixels of a 4:2:2 pair.
#[inline]
pub fn yuv_to_rgb(y: u8, d: i32, e: i32) -> [u8; 3] {
    let c = y as i32 - 16;
    [
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Convert YUYV (Y0 U Y1 V) to RGB24
///
/// On error `out` is left exactly as it was.
pub fn yuyv_to_rgb(
    data: &[u8],
    width: u32,
    height: u32,
    out: &mut Vec<u8>,
) -> Result<(), DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDimensions { width, height });
    }
    let pixel_count = width as usize * height as usize;
    let expected = pixel_count * 2;
    if data.len() < expected {
        return Err(DecodeError::ShortInput {
            expected,
            actual: data.len(),
        });
    }

    out.resize(pixel_count * 3, 0);

    // Odd pixel counts leave a trailing half pair; its luma still decodes
    for (src, dst) in data[..expected]
        .chunks(4)
        .zip(out.chunks_mut(6))
    {
        let d = src.get(1).copied().unwrap_or(128) as i32 - 128;
        let e = src.get(3).copied().unwrap_or(128) as i32 - 128;

        dst[..3].copy_from_slice(&yuv_to_rgb(src[0], d, e));
        if dst.len() == 6 {
            dst[3..].copy_from_slice(&yuv_to_rgb(src[2], d, e));
        }
    }

    Ok(())
}

/// Expand 8-bit grayscale to RGB24
pub fn gray_to_rgb(gray: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(gray.len() * 3);
    for &g in gray {
        out.extend_from_slice(&[g, g, g]);
    }
}

/// Drop the alpha channel from RGBA
pub fn rgba_to_rgb(rgba: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        out.extend_from_slice(&px[..3]);
    }
}

/// Expand grayscale+alpha to RGB24, discarding alpha
pub fn gray_alpha_to_rgb(la: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(la.len() / 2 * 3);
    for px in la.chunks_exact(2) {
        out.extend_from_slice(&[px[0], px[0], px[0]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_and_bright_pairs() {
        // 2x2: a mid-gray pair then a bright pair, neutral chroma
        let yuyv = [128u8, 128, 128, 128, 255, 128, 255, 128];
        let mut rgb = Vec::new();
        yuyv_to_rgb(&yuyv, 2, 2, &mut rgb).unwrap();
        assert_eq!(rgb.len(), 12);

        let (dark, bright) = rgb.split_at(6);
        for (d, b) in dark.iter().zip(bright) {
            assert!(d < b, "first pair should be darker: {:?}", rgb);
        }
        assert_eq!(bright, &[255; 6]);
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        let yuyv = [128u8, 128, 128, 128];
        let mut rgb = Vec::new();
        yuyv_to_rgb(&yuyv, 2, 1, &mut rgb).unwrap();
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
        // (298 * 112 + 128) >> 8 = 130
        assert_eq!(rgb[0], 130);
    }

    #[test]
    fn test_yuyv_studio_range_limits() {
        // Y=16 is black and Y=235 is white in studio range
        let yuyv = [16u8, 128, 235, 128];
        let mut rgb = Vec::new();
        yuyv_to_rgb(&yuyv, 2, 1, &mut rgb).unwrap();
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_pair_shares_chroma() {
        // Strong red chroma applied to both samples of the pair
        let yuyv = [100u8, 128, 100, 240];
        let mut rgb = Vec::new();
        yuyv_to_rgb(&yuyv, 2, 1, &mut rgb).unwrap();
        assert_eq!(&rgb[..3], &rgb[3..]);
        assert!(rgb[0] > rgb[1] && rgb[0] > rgb[2]);
    }

    #[test]
    fn test_yuyv_short_input_leaves_output_untouched() {
        let mut rgb = vec![7u8; 5];
        let err = yuyv_to_rgb(&[0u8; 6], 2, 2, &mut rgb).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortInput {
                expected: 8,
                actual: 6
            }
        );
        assert_eq!(rgb, vec![7u8; 5]);
    }

    #[test]
    fn test_yuyv_zero_dimensions_rejected() {
        let mut rgb = Vec::new();
        assert!(yuyv_to_rgb(&[], 0, 4, &mut rgb).is_err());
        assert!(rgb.is_empty());
    }

    #[test]
    fn test_gray_and_alpha_expansion() {
        let mut rgb = Vec::new();
        gray_to_rgb(&[10, 20], &mut rgb);
        assert_eq!(rgb, vec![10, 10, 10, 20, 20, 20]);

        rgba_to_rgb(&[1, 2, 3, 255, 4, 5, 6, 0], &mut rgb);
        assert_eq!(rgb, vec![1, 2, 3, 4, 5, 6]);

        gray_alpha_to_rgb(&[9, 255], &mut rgb);
        assert_eq!(rgb, vec![9, 9, 9]);
    }
}
