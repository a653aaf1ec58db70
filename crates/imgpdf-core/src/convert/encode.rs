//! Baseline JPEG encoding.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use super::ConvertError;

/// Encode RGB pixels to JPEG bytes at `quality` (clamped to 1-100).
///
/// # Errors
///
/// Returns `ConvertError::InvalidDimensions` for an empty image and
/// `ConvertError::EncodingFailed` if the encoder rejects the data.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ConvertError::InvalidDimensions { width, height });
    }

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ConvertError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([
                (x * 255 / width) as u8,
                (y * 255 / height) as u8,
                ((x + y) * 127 / (width + height)) as u8,
            ])
        })
    }

    #[test]
    fn test_encode_jpeg_markers() {
        let jpeg = encode_jpeg(&gradient(100, 100), 90).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_zero_dimensions() {
        let result = encode_jpeg(&RgbImage::new(0, 10), 90);
        assert!(matches!(
            result,
            Err(ConvertError::InvalidDimensions { width: 0, height: 10 })
        ));
    }

    #[test]
    fn test_encode_jpeg_quality_clamping() {
        let img = gradient(10, 10);
        assert!(encode_jpeg(&img, 0).is_ok());
        assert!(encode_jpeg(&img, 255).is_ok());
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let img = gradient(64, 64);
        let low = encode_jpeg(&img, 10).unwrap();
        let high = encode_jpeg(&img, 100).unwrap();
        assert!(high.len() > low.len());
    }
}
