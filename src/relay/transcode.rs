//! Decode, downscale, and re-encode thumbnails as JPEG.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};

/// A re-encoded thumbnail and its final dimensions.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Output dimensions for an image of `width`x`height` bounded to `max_width`.
///
/// Images already within the bound keep their size. Height follows the
/// original aspect ratio and never drops below one pixel.
#[must_use]
pub fn bounded_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (f64::from(height) * f64::from(max_width) / f64::from(width)).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled_height = (scaled as u32).max(1);
    (max_width, scaled_height)
}

/// Decode arbitrary image bytes and produce a bounded-width JPEG.
///
/// # Errors
///
/// Returns an error if the bytes are not a decodable image or encoding fails.
pub fn transcode_to_jpeg(
    data: &[u8],
    max_width: u32,
    quality: u8,
) -> Result<Thumbnail, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let (width, height) = img.dimensions();
    let (target_width, target_height) = bounded_dimensions(width, height, max_width);

    let img = if (target_width, target_height) == (width, height) {
        img
    } else {
        img.resize_exact(target_width, target_height, FilterType::Triangle)
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut jpeg = Vec::new();
    rgb.write_to(&mut jpeg, ImageOutputFormat::Jpeg(quality))?;

    Ok(Thumbnail {
        jpeg,
        width: target_width,
        height: target_height,
    })
}
