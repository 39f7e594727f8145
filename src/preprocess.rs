use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{CaptionError, Result};
use crate::ImagePreprocessor;

/// An image ready to be attached to a generate request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 (standard alphabet) JPEG bytes.
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

/// Decodes an image from disk, bounds its longest side and re-encodes it as JPEG.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_dimension: u32,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Shrink `img` so neither side exceeds the bound. Smaller images are left alone.
    pub fn bound(&self, img: DynamicImage) -> DynamicImage {
        let (w, h) = img.dimensions();
        if w.max(h) <= self.max_dimension {
            return img;
        }
        img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
    }

    /// Bound and encode an already-decoded image.
    pub fn encode(&self, img: DynamicImage) -> Result<EncodedImage> {
        let img = self.bound(img);
        let (width, height) = img.dimensions();
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

        let mut buf = Cursor::new(Vec::new());
        rgb.write_to(&mut buf, ImageFormat::Jpeg)
            .map_err(|e| CaptionError::ImageEncode(e.to_string()))?;

        Ok(EncodedImage {
            base64: base64::engine::general_purpose::STANDARD.encode(buf.into_inner()),
            width,
            height,
        })
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new(crate::types::DEFAULT_MAX_DIMENSION)
    }
}

impl ImagePreprocessor for ImageProcessor {
    fn process_image(&self, path: &Path) -> Result<(EncodedImage, PathBuf)> {
        let img = image::open(path)
            .map_err(|e| CaptionError::ImageRead(format!("{}: {}", path.display(), e)))?;
        let encoded = self.encode(img)?;
        Ok((encoded, path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn bound_shrinks_longest_side() {
        let processor = ImageProcessor::new(384);
        let img = DynamicImage::ImageRgba8(RgbaImage::new(1000, 500));
        let bounded = processor.bound(img);
        assert_eq!(bounded.dimensions(), (384, 192));
    }

    #[test]
    fn bound_keeps_small_images() {
        let processor = ImageProcessor::new(384);
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 80));
        assert_eq!(processor.bound(img).dimensions(), (100, 80));
    }

    #[test]
    fn encode_produces_jpeg_base64() {
        let processor = ImageProcessor::new(64);
        let img = DynamicImage::ImageRgba8(RgbaImage::new(128, 32));
        let encoded = processor.encode(img).unwrap();
        assert_eq!((encoded.width, encoded.height), (64, 16));

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded.base64)
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn process_image_returns_source_as_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        DynamicImage::ImageRgba8(RgbaImage::new(20, 20))
            .save(&path)
            .unwrap();

        let (encoded, hint) = ImageProcessor::default().process_image(&path).unwrap();
        assert_eq!(hint, path);
        assert!(!encoded.base64.is_empty());
    }

    #[test]
    fn process_image_missing_file() {
        let result = ImageProcessor::default().process_image(Path::new("/nonexistent/x.png"));
        assert!(matches!(result, Err(CaptionError::ImageRead(_))));
    }
}
