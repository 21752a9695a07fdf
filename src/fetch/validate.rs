//! Payload validation: size floor, format sniffing and header decode.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader};
use tracing::debug;

use super::DownloadError;

/// Raster formats accepted as chapter pages.
const ACCEPTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// Checks that `bytes` is a plausible page image.
///
/// The payload must be larger than `min_bytes`, sniff as an accepted raster
/// format and have a decodable header.
///
/// # Errors
///
/// Returns [`DownloadError::Validation`] describing the first failed check.
pub fn validate_payload(url: &str, bytes: &[u8], min_bytes: u64) -> Result<ImageFormat, DownloadError> {
    if (bytes.len() as u64) <= min_bytes {
        return Err(DownloadError::validation(
            url,
            format!("payload of {} bytes is not above the {min_bytes} byte minimum", bytes.len()),
        ));
    }

    let format = image::guess_format(bytes)
        .map_err(|_| DownloadError::validation(url, "unrecognized image format"))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(DownloadError::validation(
            url,
            format!("unsupported image format {format:?}"),
        ));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| DownloadError::validation(url, format!("image header does not decode: {e}")))?;
    if width == 0 || height == 0 {
        return Err(DownloadError::validation(url, "image has zero dimensions"));
    }

    debug!(?format, width, height, "payload validated");
    Ok(format)
}

/// Returns the sniffed format of a cached page file when it is still valid.
///
/// Unreadable or invalid files yield `None` so the caller refetches them.
#[must_use]
pub fn validate_cached_file(path: &Path, min_bytes: u64) -> Option<(ImageFormat, Vec<u8>)> {
    let bytes = std::fs::read(path).ok()?;
    let format = validate_payload(&path.display().to_string(), &bytes, min_bytes).ok()?;
    Some((format, bytes))
}

/// File extension used for cached pages of `format`.
#[must_use]
pub fn extension_for(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}
