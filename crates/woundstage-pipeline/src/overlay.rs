//! Human-readable renderings of a case: the mask image and the red
//! wound overlay.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::mask::Mask;

/// Overlay tint for wound pixels.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Render a mask as an 8-bit grayscale image (foreground 255,
/// background 0).
#[must_use]
pub fn mask_image(mask: &Mask) -> GrayImage {
    let gray = mask.as_gray();
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y).0[0] > 0 { 255 } else { 0 }])
    })
}

/// Blend [`OVERLAY_COLOR`] into `image` at `alpha` opacity wherever
/// `mask` is foreground.
///
/// Background pixels are copied unchanged. Blended channels are
/// truncated toward zero. `alpha` is clamped to `[0, 1]`. The mask must
/// have the same dimensions as the image.
#[must_use = "returns the overlay image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn overlay_mask(image: &RgbImage, mask: &Mask, alpha: f32) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    let mut out = image.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if !mask.is_foreground(x, y) {
            continue;
        }
        for (c, value) in px.0.iter_mut().enumerate() {
            let blended =
                f32::from(*value).mul_add(1.0 - alpha, f32::from(OVERLAY_COLOR.0[c]) * alpha);
            *value = blended.clamp(0.0, 255.0) as u8;
        }
    }
    out
}
