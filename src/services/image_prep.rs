use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use strum::{Display, EnumString};

/// Default JPEG quality, equivalent to a 0.7 compression factor.
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// How an uploaded image is encoded before it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    /// Re-encode as baseline JPEG at the configured quality.
    #[default]
    Jpeg,
    /// Re-encode losslessly as PNG.
    Png,
    /// Forward the caller's bytes untouched.
    Original,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingOptions {
    pub encoding: ImageEncoding,
    pub jpeg_quality: u8,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            encoding: ImageEncoding::Jpeg,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Image bytes ready to be sent as the `file` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

/// Sniff, decode and re-encode an uploaded image.
pub fn prepare_image(bytes: &[u8], options: EncodingOptions) -> Result<PreparedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let format = image::guess_format(bytes).map_err(ImageError::UnknownFormat)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) {
        return Err(ImageError::Unsupported(format));
    }

    if options.encoding == ImageEncoding::Original {
        return Ok(PreparedImage {
            bytes: bytes.to_vec(),
            content_type: format.to_mime_type().to_string(),
            file_name: format!("upload.{}", extension(format)),
        });
    }

    let decoded =
        image::load_from_memory_with_format(bytes, format).map_err(ImageError::Decode)?;

    match options.encoding {
        ImageEncoding::Png => encode_png(&decoded),
        _ => encode_jpeg(&decoded, options.jpeg_quality),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<PreparedImage, ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    // JPEG carries no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(ImageError::Encode)?;

    Ok(PreparedImage {
        bytes: buf,
        content_type: "image/jpeg".to_string(),
        file_name: "upload.jpg".to_string(),
    })
}

fn encode_png(img: &DynamicImage) -> Result<PreparedImage, ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(ImageError::Encode)?;

    Ok(PreparedImage {
        bytes: buf,
        content_type: "image/png".to_string(),
        file_name: "upload.png".to_string(),
    })
}

fn extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        _ => "jpg",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image payload is empty")]
    Empty,

    #[error("Unrecognized image format: {0}")]
    UnknownFormat(#[source] image::ImageError),

    #[error("Unsupported image format: {0:?}")]
    Unsupported(ImageFormat),

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}
