//! Page normalization: decode, bound the long edge, flatten to RGB and
//! re-encode as baseline JPEG carrying a valid JFIF density.

use image::codecs::jpeg::{JpegEncoder, PixelDensity, PixelDensityUnit};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageError, Rgb, RgbImage};

use super::density::{DEFAULT_DPI, Dpi, effective_density};

/// Default bound for the longer page edge, in pixels.
pub const DEFAULT_MAX_EDGE: u32 = 1600;

/// Default JPEG quality for re-encoded pages.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// How pages are normalized before packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_edge: u32,
    pub jpeg_quality: u8,
    pub default_dpi: u16,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            default_dpi: DEFAULT_DPI,
        }
    }
}

/// A page ready to be packed.
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub density: Dpi,
}

/// Output size for a `width` x `height` page under `max_edge`.
///
/// Pages within the bound keep their size. Otherwise the longer edge becomes
/// exactly `max_edge` and the shorter one is scaled proportionally and
/// rounded, never below 1.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn target_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long = width.max(height);
    if max_edge == 0 || long <= max_edge {
        return (width, height);
    }
    let scale = |edge: u32| -> u32 {
        let scaled = (u64::from(edge) * u64::from(max_edge) + u64::from(long) / 2) / u64::from(long);
        (scaled as u32).clamp(1, max_edge)
    };
    if width >= height {
        (max_edge, scale(height))
    } else {
        (scale(width), max_edge)
    }
}

/// Composites transparent pixels over white.
fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| -> u8 {
            let value = (u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255;
            u8::try_from(value).unwrap_or(u8::MAX)
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Normalizes one stored page.
///
/// # Errors
///
/// Returns the [`ImageError`] when the page cannot be decoded or encoded.
pub fn normalize_page(bytes: &[u8], options: &NormalizeOptions) -> Result<NormalizedPage, ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = decoded.dimensions();
    let (target_w, target_h) = target_dimensions(width, height, options.max_edge);

    let mut rgb = flatten_to_rgb(&decoded);
    if (target_w, target_h) != (width, height) {
        rgb = image::imageops::resize(&rgb, target_w, target_h, FilterType::Lanczos3);
    }

    let density = effective_density(bytes, options.default_dpi);
    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, options.jpeg_quality.clamp(1, 100));
        encoder.set_pixel_density(PixelDensity {
            density: (density.x, density.y),
            unit: PixelDensityUnit::Inches,
        });
        encoder.encode(&rgb, rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    }

    Ok(NormalizedPage {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
        density,
    })
}
