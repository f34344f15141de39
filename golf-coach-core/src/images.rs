//! Image intake helpers shared by the server and the CLI.
//!
//! - server side: MIME / size / decode validation, base64 transport, thumbnails
//! - client side: media type sniffing and compression of oversized photos

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use thiserror::Error;

use crate::config::ImageConfig;

pub const MEDIA_TYPE_JPEG: &str = "image/jpeg";
pub const MEDIA_TYPE_PNG: &str = "image/png";

/// JPEG qualities tried in order when shrinking an oversized photo.
const COMPRESSION_QUALITIES: [u8; 4] = [85, 70, 55, 40];

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid image format. Allowed formats: {allowed}")]
    InvalidFormat { content_type: String, allowed: String },

    #[error("Image size ({size_mb:.2}MB) exceeds maximum allowed size ({max_mb}MB)")]
    TooLarge { size_mb: f64, max_mb: u64 },

    #[error("Invalid image file: {0}")]
    Corrupt(String),

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

/// Check an uploaded image against the configured MIME list, size cap and
/// decodability. Returns the normalized media type for the vision API.
pub fn validate_image(
    bytes: &[u8],
    content_type: Option<&str>,
    config: &ImageConfig,
) -> Result<String, ImageError> {
    let content_type = content_type.unwrap_or_default();
    if !config
        .allowed_formats
        .iter()
        .any(|f| f.eq_ignore_ascii_case(content_type))
    {
        return Err(ImageError::InvalidFormat {
            content_type: content_type.to_string(),
            allowed: config.allowed_formats.join(", "),
        });
    }

    if bytes.len() as u64 > config.max_size_bytes() {
        return Err(ImageError::TooLarge {
            size_mb: bytes.len() as f64 / (1024.0 * 1024.0),
            max_mb: config.max_size_mb,
        });
    }

    image::load_from_memory(bytes).map_err(|e| ImageError::Corrupt(e.to_string()))?;

    Ok(normalize_media_type(Some(content_type)))
}

/// `image/jpg` is not a registered type; the vision API only accepts `image/jpeg`.
pub fn normalize_media_type(content_type: Option<&str>) -> String {
    match content_type.map(|c| c.trim().to_ascii_lowercase()) {
        None => MEDIA_TYPE_JPEG.to_string(),
        Some(c) if c.is_empty() || c == "image/jpg" || c == MEDIA_TYPE_JPEG => {
            MEDIA_TYPE_JPEG.to_string()
        }
        Some(c) => c,
    }
}

/// Detect JPEG or PNG from magic bytes. Anything else is `None`.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(MEDIA_TYPE_JPEG),
        ImageFormat::Png => Some(MEDIA_TYPE_PNG),
        _ => None,
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, ImageError> {
    Ok(STANDARD.decode(data.trim())?)
}

/// Shrink a base64 image to fit within `max_w` x `max_h`, keeping aspect
/// ratio and source format. Falls back to the original data on any failure.
pub fn create_thumbnail(base64_image: &str, max_w: u32, max_h: u32) -> String {
    match try_thumbnail(base64_image, max_w, max_h) {
        Ok(thumb) => thumb,
        Err(e) => {
            tracing::debug!(error = %e, "Thumbnail creation failed, returning original image");
            base64_image.to_string()
        }
    }
}

fn try_thumbnail(base64_image: &str, max_w: u32, max_h: u32) -> Result<String, ImageError> {
    let bytes = decode_base64(base64_image)?;
    let format = image::guess_format(&bytes).map_err(|e| ImageError::Corrupt(e.to_string()))?;
    let img = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| ImageError::Corrupt(e.to_string()))?;

    let thumb = if img.width() <= max_w && img.height() <= max_h {
        img
    } else {
        img.thumbnail(max_w, max_h)
    };

    let output = match format {
        ImageFormat::Png => ImageOutputFormat::Png,
        _ => ImageOutputFormat::Jpeg(85),
    };
    let encoded = encode_image(&thumb, output)?;
    Ok(encode_base64(&encoded))
}

/// Client-side compression. Returns the input untouched when it already fits
/// in `max_bytes`; otherwise downsizes to `max_dimension` and re-encodes as
/// JPEG at decreasing quality until it fits. If nothing fits, the smallest
/// attempt is returned.
pub fn compress_to_limit(
    bytes: &[u8],
    max_bytes: usize,
    max_dimension: u32,
) -> Result<Vec<u8>, ImageError> {
    if bytes.len() <= max_bytes {
        return Ok(bytes.to_vec());
    }

    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Corrupt(e.to_string()))?;
    let img = if img.width() > max_dimension || img.height() > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::CatmullRom)
    } else {
        img
    };
    // JPEG has no alpha channel.
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut smallest: Option<Vec<u8>> = None;
    for quality in COMPRESSION_QUALITIES {
        let encoded = encode_image(&img, ImageOutputFormat::Jpeg(quality))?;
        tracing::debug!(quality, size = encoded.len(), "Compressed image attempt");
        if encoded.len() <= max_bytes {
            return Ok(encoded);
        }
        if smallest.as_ref().map_or(true, |s| encoded.len() < s.len()) {
            smallest = Some(encoded);
        }
    }

    smallest.ok_or_else(|| ImageError::Encode("no compression attempt produced output".into()))
}

fn encode_image(img: &DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
