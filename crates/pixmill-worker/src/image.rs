//! Image processor: streaming decode → optimal downscale → WebP encode.

use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageReader;

use pixmill_core::config::CompressionConfig;
use pixmill_core::error::{AppError, ErrorKind};
use pixmill_core::result::AppResult;

/// Decodes an image, downscales it to fit the configured bounds while
/// preserving aspect ratio, and re-encodes it as lossy WebP.
///
/// [`process`](ImageProcessor::process) is CPU-bound; callers run it on a
/// blocking thread.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    quality: f32,
    max_width: u32,
    max_height: u32,
}

impl ImageProcessor {
    /// Create a processor from compression configuration.
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            quality: f32::from(config.webp_quality),
            max_width: config.max_width,
            max_height: config.max_height,
        }
    }

    /// Transform raw image bytes into WebP bytes.
    pub fn process(&self, data: &[u8]) -> AppResult<Vec<u8>> {
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Image, "Failed to sniff image format", e)
            })?
            .decode()
            .map_err(|e| AppError::with_source(ErrorKind::Image, "Failed to decode image", e))?;

        let (width, height) = (img.width(), img.height());
        let scale = optimal_scale(width, height, self.max_width, self.max_height);

        let img = if scale < 1.0 {
            let new_width = scaled_dimension(width, scale);
            let new_height = scaled_dimension(height, scale);
            img.resize_exact(new_width, new_height, FilterType::Lanczos3)
        } else {
            img
        };

        let rgba = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
        Ok(encoder.encode(self.quality).to_vec())
    }
}

/// The downscale factor that fits `(w, h)` inside `(max_width, max_height)`:
/// `1.0` when the image is already within bounds, otherwise
/// `min(max_width / w, max_height / h)`.
pub fn optimal_scale(w: u32, h: u32, max_width: u32, max_height: u32) -> f64 {
    if w <= max_width && h <= max_height {
        return 1.0;
    }
    f64::min(
        f64::from(max_width) / f64::from(w),
        f64::from(max_height) / f64::from(h),
    )
}

/// Apply a scale factor to one dimension, flooring so the result never
/// exceeds the bound, but keeping at least one pixel.
fn scaled_dimension(value: u32, scale: f64) -> u32 {
    let scaled = (f64::from(value) * scale).floor();
    if scaled < 1.0 {
        1
    } else {
        scaled as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(quality: u8, max_width: u32, max_height: u32) -> ImageProcessor {
        ImageProcessor {
            quality: f32::from(quality),
            max_width,
            max_height,
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_scale_is_one_within_bounds() {
        assert_eq!(optimal_scale(100, 50, 1980, 1980), 1.0);
        assert_eq!(optimal_scale(1980, 1980, 1980, 1980), 1.0);
    }

    #[test]
    fn test_scale_fits_inside_bounds() {
        let scale = optimal_scale(3000, 2000, 1980, 1980);
        assert!((scale - 0.66).abs() < 0.01);
        assert!(scaled_dimension(3000, scale) <= 1980);
        assert!(scaled_dimension(2000, scale) <= 1980);
    }

    #[test]
    fn test_scale_uses_tighter_axis() {
        // Tall image: the height bound dominates.
        let scale = optimal_scale(1000, 4000, 1980, 1980);
        assert!((scale - 0.495).abs() < 0.001);
    }

    #[test]
    fn test_scaled_dimension_never_zero() {
        assert_eq!(scaled_dimension(3, 0.1), 1);
    }

    #[test]
    fn test_process_emits_webp() {
        let out = processor(75, 1980, 1980).process(&png_bytes(8, 8)).unwrap();
        assert_eq!(&out[..4], b"RIFF");
        assert_eq!(&out[8..12], b"WEBP");
    }

    #[test]
    fn test_process_downscales_oversized_image() {
        let out = processor(75, 50, 50).process(&png_bytes(200, 100)).unwrap();
        let decoded = webp::Decoder::new(&out).decode().unwrap();
        assert!(decoded.width() <= 50);
        assert!(decoded.height() <= 50);
        // Aspect ratio preserved: 2:1 input stays 2:1.
        assert_eq!(decoded.width(), 50);
        assert_eq!(decoded.height(), 25);
    }

    #[test]
    fn test_process_keeps_small_image_dimensions() {
        let out = processor(75, 1980, 1980).process(&png_bytes(16, 12)).unwrap();
        let decoded = webp::Decoder::new(&out).decode().unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 12);
    }

    #[test]
    fn test_process_rejects_garbage() {
        let err = processor(75, 1980, 1980)
            .process(b"definitely not an image")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Image);
    }
}
