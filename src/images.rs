//! Image utilities shared by screenshots and the embedding client
//!
//! Captured or downloaded images are resized so the longer edge fits a bound,
//! flattened onto white, and encoded as JPEG. If the encoding is still too
//! large, a ladder of lower qualities is tried in order.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{
    codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView, Rgb,
    RgbImage,
};

use crate::config::ImageConfig;

pub const JPEG_MIME: &str = "image/jpeg";
pub const SVG_MIME: &str = "image/svg+xml";

#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("image is {width}x{height}, minimum is {min}")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("content is not an image")]
    NotAnImage,

    #[error("failed to download image: {0}")]
    Download(String),
}

/// Result of encoding one image
#[derive(Debug)]
pub struct CompressionResult {
    pub data: Vec<u8>,
    pub original_dimensions: (u32, u32),
    pub new_dimensions: (u32, u32),
    pub was_resized: bool,
    /// JPEG quality of the returned encoding
    pub quality: u8,
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Split a `data:<mime>;base64,<payload>` URI into its MIME type and decoded bytes.
pub fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = BASE64.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

pub fn is_data_uri(value: &str) -> bool {
    value.starts_with("data:")
}

/// Raw base64 payloads are assumed to be JPEG.
pub fn ensure_data_uri(value: &str) -> String {
    if is_data_uri(value) {
        value.to_string()
    } else {
        format!("data:{JPEG_MIME};base64,{}", value.trim())
    }
}

/// Resize, flatten and encode `raw` with default quality settings, returning an
/// inline JPEG data URI.
pub fn postprocess(raw: &[u8], max_dimension: u32) -> Result<String, EncodingError> {
    let config = ImageConfig {
        max_dimension,
        ..ImageConfig::default()
    };
    postprocess_with(raw, &config)
}

pub fn postprocess_with(raw: &[u8], config: &ImageConfig) -> Result<String, EncodingError> {
    let result = compress_image(
        raw,
        config.max_dimension,
        config.quality,
        &config.fallback_qualities,
        config.max_encoded_bytes,
    )?;

    if result.was_resized {
        log::debug!(
            "resized {}x{} -> {}x{}, q={} ({} bytes)",
            result.original_dimensions.0,
            result.original_dimensions.1,
            result.new_dimensions.0,
            result.new_dimensions.1,
            result.quality,
            result.data.len()
        );
    }

    Ok(to_data_uri(JPEG_MIME, &result.data))
}

/// Encode `data` as JPEG at `quality`, stepping through `fallback_qualities`
/// while the output exceeds `max_bytes`. The last attempt is returned even if
/// it is still over the limit.
pub fn compress_image(
    data: &[u8],
    max_dimension: u32,
    quality: u8,
    fallback_qualities: &[u8],
    max_bytes: usize,
) -> Result<CompressionResult, EncodingError> {
    let img = image::load_from_memory(data).map_err(|e| EncodingError::Decode(e.to_string()))?;

    let (orig_w, orig_h) = img.dimensions();
    let (new_w, new_h, was_resized) = fit_within(orig_w, orig_h, max_dimension);

    let processed = if was_resized {
        img.resize_exact(new_w, new_h, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = flatten_on_white(&processed);

    let mut quality = quality;
    let mut encoded = encode_jpeg(&rgb, quality)?;
    for &fallback in fallback_qualities {
        if encoded.len() <= max_bytes {
            break;
        }
        quality = fallback;
        encoded = encode_jpeg(&rgb, quality)?;
    }

    Ok(CompressionResult {
        data: encoded,
        original_dimensions: (orig_w, orig_h),
        new_dimensions: rgb.dimensions(),
        was_resized,
        quality,
    })
}

/// Download a remote image, check it, and turn it into an inline JPEG.
pub fn prepare_remote_image(
    url: &str,
    config: &ImageConfig,
    user_agent: &str,
) -> Result<String, EncodingError> {
    let bytes = download_image(url, config, user_agent)?;
    validate_image(&bytes, config.min_dimension)?;
    postprocess_with(&bytes, config)
}

pub fn download_image(
    url: &str,
    config: &ImageConfig,
    user_agent: &str,
) -> Result<Vec<u8>, EncodingError> {
    let client = crate::scrape::http_client(user_agent, config.download_timeout())
        .map_err(|e| EncodingError::Download(crate::scrape::get_error(&e)))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| EncodingError::Download(crate::scrape::get_error(&e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(EncodingError::Download(format!("status {}", status.as_u16())));
    }

    if let Some(len) = response.content_length() {
        if len as usize > config.max_download_bytes {
            return Err(EncodingError::TooLarge {
                size: len as usize,
                limit: config.max_download_bytes,
            });
        }
    }

    let bytes = response
        .bytes()
        .map_err(|e| EncodingError::Download(crate::scrape::get_error(&e)))?;

    if bytes.len() > config.max_download_bytes {
        return Err(EncodingError::TooLarge {
            size: bytes.len(),
            limit: config.max_download_bytes,
        });
    }

    Ok(bytes.to_vec())
}

/// Reject payloads that are not images or are smaller than `min_dimension` on
/// either side. Returns the decoded dimensions.
pub fn validate_image(bytes: &[u8], min_dimension: u32) -> Result<(u32, u32), EncodingError> {
    if bytes.is_empty() || is_html_content(bytes) || !infer::is_image(bytes) {
        return Err(EncodingError::NotAnImage);
    }

    let (width, height) = image::load_from_memory(bytes)
        .map_err(|e| EncodingError::Decode(e.to_string()))?
        .dimensions();

    if width < min_dimension || height < min_dimension {
        return Err(EncodingError::TooSmall {
            width,
            height,
            min: min_dimension,
        });
    }

    Ok((width, height))
}

/// A `max_dimension` of 0 disables resizing.
fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32, bool) {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return (width, height, false);
    }

    let scale = max_dimension as f64 / width.max(height) as f64;
    let new_w = (width as f64 * scale).round() as u32;
    let new_h = (height as f64 * scale).round() as u32;
    (new_w.clamp(1, max_dimension), new_h.clamp(1, max_dimension), true)
}

fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .map_err(|e| EncodingError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

fn is_html_content(bytes: &[u8]) -> bool {
    let prefix = bytes[..bytes.len().min(64)].to_ascii_lowercase();
    let prefix = prefix.trim_ascii_start();
    prefix.starts_with(b"<!doctype") || prefix.starts_with(b"<html")
}
