use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Per-frame adjustments applied between capture and save/preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTransform {
    /// Flip horizontally, so the preview behaves like a mirror.
    pub mirror: bool,
}

impl FrameTransform {
    pub fn new(mirror: bool) -> Self {
        Self { mirror }
    }

    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        if self.mirror {
            image.fliph()
        } else {
            image
        }
    }
}

/// Decode an encoded frame (JPEG, or any format the `image` crate can sniff).
pub fn decode(data: &[u8]) -> Result<DynamicImage, ImageError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()?;
    debug!(width = img.width(), height = img.height(), "decoded frame");
    Ok(img)
}

/// Encode as baseline JPEG. Alpha is dropped since JPEG cannot carry it.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::with_capacity(rgb.as_raw().len() / 4);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(buf)
}

/// Downscale by `scale` in `(0, 1]`. Returns `None` for any other factor.
pub fn scaled(image: &DynamicImage, scale: f64) -> Option<DynamicImage> {
    if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
        return None;
    }
    if scale == 1.0 {
        return Some(image.clone());
    }
    let width = ((image.width() as f64 * scale).round() as u32).max(1);
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    Some(image.resize_exact(width, height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn two_pixel_image() -> DynamicImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn mirror_flips_horizontally() {
        let out = FrameTransform::new(true).apply(two_pixel_image()).to_rgb8();
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn no_mirror_is_identity() {
        let out = FrameTransform::default().apply(two_pixel_image()).to_rgb8();
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn jpeg_encode_then_decode() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([10, 200, 30])));
        let bytes = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let back = decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (16, 8));
    }

    #[test]
    fn encode_drops_alpha() {
        let img = DynamicImage::new_rgba8(4, 4);
        assert!(encode_jpeg(&img, 80).is_ok());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode(b"definitely not an image").is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn scale_bounds() {
        let img = DynamicImage::new_rgb8(100, 50);
        let half = scaled(&img, 0.5).unwrap();
        assert_eq!((half.width(), half.height()), (50, 25));
        let tiny = scaled(&img, 0.001).unwrap();
        assert_eq!((tiny.width(), tiny.height()), (1, 1));
        assert!(scaled(&img, 0.0).is_none());
        assert!(scaled(&img, 1.5).is_none());
        assert!(scaled(&img, f64::NAN).is_none());
    }
}
