//! Image decoding and thumbnail encoding.
//!
//! CPU-bound; callers run [`render`] inside `spawn_blocking`.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use imagegen_core::image_format::ImageFormat;

use crate::error::StorageError;

/// Thumbnails fit inside this square, preserving aspect ratio.
pub const THUMBNAIL_MAX_DIM: u32 = 256;

/// Prefix that derives a thumbnail file name from its primary asset.
pub const THUMBNAIL_PREFIX: &str = "thumb_";

/// Result of decoding a primary asset.
///
/// Decoding succeeded, so the dimensions are always known even when the
/// thumbnail could not be encoded.
#[derive(Debug)]
pub struct Rendered {
    /// Pixel dimensions of the primary asset.
    pub width: u32,
    pub height: u32,
    pub thumbnail: Result<Thumbnail, StorageError>,
}

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Format a thumbnail of `source` is encoded in.
///
/// WebP thumbnails are written as PNG since the encoder only supports
/// lossless WebP.
pub fn thumbnail_format(source: ImageFormat) -> ImageFormat {
    match source {
        ImageFormat::Webp => ImageFormat::Png,
        other => other,
    }
}

/// Thumbnail file name for the primary asset `stem` (no extension).
pub fn thumbnail_name(stem: &str, source: ImageFormat) -> String {
    format!(
        "{THUMBNAIL_PREFIX}{stem}.{}",
        thumbnail_format(source).extension()
    )
}

fn codec(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Webp => image::ImageFormat::WebP,
    }
}

/// Decode `bytes` as `format`, report its size, and encode a thumbnail.
///
/// Fails only when `bytes` cannot be decoded.
pub fn render(bytes: &[u8], format: ImageFormat) -> Result<Rendered, StorageError> {
    let decoded = image::load_from_memory_with_format(bytes, codec(format))
        .map_err(|e| StorageError::InvalidImage(e.to_string()))?;
    Ok(render_decoded(decoded, format, encode))
}

fn render_decoded<E>(decoded: DynamicImage, source: ImageFormat, encode: E) -> Rendered
where
    E: FnOnce(&DynamicImage, ImageFormat) -> Result<Vec<u8>, StorageError>,
{
    let (width, height) = decoded.dimensions();
    let resized = if width <= THUMBNAIL_MAX_DIM && height <= THUMBNAIL_MAX_DIM {
        decoded
    } else {
        decoded.resize(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM, FilterType::Lanczos3)
    };

    let format = thumbnail_format(source);
    let thumbnail = encode(&resized, format).map(|bytes| Thumbnail { bytes, format });
    Rendered {
        width,
        height,
        thumbnail,
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, StorageError> {
    let encodable = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => DynamicImage::ImageRgba8(image.to_rgba8()),
    };
    let mut out = Cursor::new(Vec::new());
    encodable
        .write_to(&mut out, codec(format))
        .map_err(|e| StorageError::InvalidImage(e.to_string()))?;
    Ok(out.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn large_image_is_bounded_and_aspect_preserved() {
        let rendered = render(&png(1024, 512), ImageFormat::Png).unwrap();
        assert_eq!((rendered.width, rendered.height), (1024, 512));

        let thumb = image::load_from_memory(&rendered.thumbnail.unwrap().bytes).unwrap();
        assert_eq!(thumb.dimensions(), (256, 128));
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let rendered = render(&png(40, 30), ImageFormat::Png).unwrap();
        let thumb = image::load_from_memory(&rendered.thumbnail.unwrap().bytes).unwrap();
        assert_eq!(thumb.dimensions(), (40, 30));
    }

    #[test]
    fn jpeg_thumbnail_stays_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 300, Rgba([1, 2, 3, 255])));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();

        let thumbnail = render(out.get_ref(), ImageFormat::Jpeg).unwrap().thumbnail.unwrap();
        assert_eq!(thumbnail.format, ImageFormat::Jpeg);
        assert_eq!(
            ImageFormat::detect(&thumbnail.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn webp_thumbnail_is_named_png() {
        assert_eq!(thumbnail_name("t1_1", ImageFormat::Webp), "thumb_t1_1.png");
        assert_eq!(thumbnail_name("t1_1", ImageFormat::Gif), "thumb_t1_1.gif");
    }

    #[test]
    fn undecodable_bytes_are_invalid() {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        assert_matches!(
            render(&bytes, ImageFormat::Png),
            Err(StorageError::InvalidImage(_))
        );
    }

    #[test]
    fn failed_encode_keeps_dimensions() {
        let decoded = image::load_from_memory(&png(600, 300)).unwrap();
        let rendered = render_decoded(decoded, ImageFormat::Png, |_, _| {
            Err(StorageError::InvalidImage("encoder refused".into()))
        });

        assert_eq!((rendered.width, rendered.height), (600, 300));
        assert_matches!(rendered.thumbnail, Err(StorageError::InvalidImage(_)));
    }
}
