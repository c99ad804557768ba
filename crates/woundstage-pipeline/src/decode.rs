//! Image decoding into the canonical RGB buffer.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an
//! 8-bit RGB image. Alpha is dropped. In [`DecodeMode::ExifAware`] the
//! decoder's orientation tag is applied before pixels are returned, so
//! a portrait phone photo comes out upright.
//!
//! This is the first step in the pipeline: raw bytes in, `RgbImage` out.

use std::io::Cursor;

use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};

use crate::types::{DecodeMode, PipelineError};

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgb(bytes: &[u8], mode: DecodeMode) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    let image = match mode {
        DecodeMode::Raw => reader.decode()?,
        DecodeMode::ExifAware => {
            let mut decoder = reader.into_decoder()?;
            let orientation = decoder.orientation()?;
            let mut image = DynamicImage::from_decoder(decoder)?;
            image.apply_orientation(orientation);
            image
        }
    };
    Ok(image.to_rgb8())
}
