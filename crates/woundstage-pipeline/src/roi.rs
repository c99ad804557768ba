//! Geometry post-processing: from mask to padded, clamped ROI crop.
//!
//! The tight box around the wound is grown by a fraction of its own
//! size on every side to compensate for under-segmentation at wound
//! borders, then clamped to the image. The crop is taken from the
//! original full-resolution image so the classifier sees every detail.
//!
//! An empty mask never aborts the pipeline: the full image becomes both
//! the box and the ROI, and `mask_was_empty` tells the review policy.

use image::RgbImage;
use image::imageops;
use tracing::debug;

use crate::mask::Mask;
use crate::types::{BoundingBox, Dimensions};

/// Output of the geometry stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiSelection {
    /// Cropped region of the original image (at least 1x1).
    pub roi: RgbImage,
    /// Tight box around the mask foreground, `None` when the mask is empty.
    pub tight_bbox: Option<BoundingBox>,
    /// Padded and clamped box the ROI was cropped from.
    pub bbox: BoundingBox,
    /// Whether the mask had no foreground and the full image was used.
    pub mask_was_empty: bool,
}

/// Grow `bbox` by `pad_ratio` of its width/height on each side and
/// clamp the result to `dimensions`.
///
/// Padding is truncated to whole pixels (`floor(width * pad_ratio)`).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn expand_bbox(bbox: BoundingBox, dimensions: Dimensions, pad_ratio: f64) -> BoundingBox {
    let pad_w = (f64::from(bbox.width()) * pad_ratio) as u32;
    let pad_h = (f64::from(bbox.height()) * pad_ratio) as u32;
    let max_x = dimensions.width.saturating_sub(1);
    let max_y = dimensions.height.saturating_sub(1);
    BoundingBox {
        x1: bbox.x1.saturating_sub(pad_w),
        y1: bbox.y1.saturating_sub(pad_h),
        x2: bbox.x2.saturating_add(pad_w).min(max_x),
        y2: bbox.y2.saturating_add(pad_h).min(max_y),
    }
}

/// Crop the inclusive `bbox` out of `image`.
#[must_use = "returns the cropped region"]
pub fn crop(image: &RgbImage, bbox: BoundingBox) -> RgbImage {
    imageops::crop_imm(image, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image()
}

/// Derive the ROI for `image` from its wound `mask`.
///
/// The mask must have the same dimensions as the image.
#[must_use]
pub fn derive_roi(image: &RgbImage, mask: &Mask, pad_ratio: f64) -> RoiSelection {
    let dimensions = Dimensions::of(image);
    debug_assert_eq!(mask.dimensions(), dimensions, "mask and image sizes differ");

    let Some(tight) = mask.bounding_box() else {
        debug!("mask is empty, using the full image as ROI");
        return RoiSelection {
            roi: image.clone(),
            tight_bbox: None,
            bbox: BoundingBox::full(dimensions),
            mask_was_empty: true,
        };
    };

    let bbox = expand_bbox(tight, dimensions, pad_ratio);
    RoiSelection {
        roi: crop(image, bbox),
        tight_bbox: Some(tight),
        bbox,
        mask_was_empty: false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    fn rect_mask(width: u32, height: u32, bbox: BoundingBox) -> Mask {
        let gray = GrayImage::from_fn(width, height, |x, y| {
            let inside = (bbox.x1..=bbox.x2).contains(&x) && (bbox.y1..=bbox.y2).contains(&y);
            Luma([u8::from(inside)])
        });
        Mask::from_gray(&gray)
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn fifty_pixel_square_pads_to_seventy_four() {
        let image = gradient(512, 512);
        let mask = rect_mask(512, 512, BoundingBox::new(100, 100, 149, 149));
        let sel = derive_roi(&image, &mask, 0.25);

        assert_eq!(sel.tight_bbox, Some(BoundingBox::new(100, 100, 149, 149)));
        assert_eq!(sel.bbox, BoundingBox::new(88, 88, 161, 161));
        assert_eq!(sel.roi.dimensions(), (74, 74));
        assert!(!sel.mask_was_empty);
        assert_eq!(sel.roi.get_pixel(0, 0), image.get_pixel(88, 88));
        assert_eq!(sel.roi.get_pixel(73, 73), image.get_pixel(161, 161));
    }

    #[test]
    fn padding_is_clamped_at_image_edges() {
        let dims = Dimensions {
            width: 100,
            height: 60,
        };
        let bbox = expand_bbox(BoundingBox::new(2, 50, 97, 59), dims, 0.25);
        assert_eq!(bbox, BoundingBox::new(0, 48, 99, 59));
        assert!(bbox.fits_within(dims));
    }

    #[test]
    fn single_pixel_region_yields_valid_box() {
        let image = gradient(10, 10);
        let mask = rect_mask(10, 10, BoundingBox::new(9, 0, 9, 0));
        let sel = derive_roi(&image, &mask, 0.25);
        // floor(1 * 0.25) == 0, so no padding.
        assert_eq!(sel.bbox, BoundingBox::new(9, 0, 9, 0));
        assert_eq!(sel.roi.dimensions(), (1, 1));
    }

    #[test]
    fn empty_mask_falls_back_to_full_image() {
        let image = gradient(40, 30);
        let mask = Mask::empty(Dimensions::of(&image));
        let sel = derive_roi(&image, &mask, 0.25);
        assert!(sel.mask_was_empty);
        assert!(sel.tight_bbox.is_none());
        assert_eq!(sel.bbox, BoundingBox::new(0, 0, 39, 29));
        assert_eq!(sel.roi.as_raw(), image.as_raw());
    }

    #[test]
    fn tight_box_inside_padded_box_inside_image() {
        let dims = Dimensions {
            width: 64,
            height: 48,
        };
        let boxes = [
            BoundingBox::new(0, 0, 63, 47),
            BoundingBox::new(0, 0, 0, 0),
            BoundingBox::new(63, 47, 63, 47),
            BoundingBox::new(10, 5, 30, 40),
            BoundingBox::new(50, 2, 60, 3),
        ];
        for pad_ratio in [0.0, 0.25, 1.0, 3.5] {
            for tight in boxes {
                let padded = expand_bbox(tight, dims, pad_ratio);
                assert!(padded.contains(&tight), "{tight:?} -> {padded:?}");
                assert!(padded.fits_within(dims), "{padded:?} outside {dims:?}");
            }
        }
    }

    #[test]
    fn derive_roi_is_idempotent() {
        let image = gradient(80, 80);
        let mask = rect_mask(80, 80, BoundingBox::new(20, 30, 45, 41));
        let first = derive_roi(&image, &mask, 0.25);
        let second = derive_roi(&image, &mask, 0.25);
        assert_eq!(first, second);
    }

    #[test]
    fn zero_padding_crops_tight_box() {
        let image = gradient(30, 30);
        let mask = rect_mask(30, 30, BoundingBox::new(3, 4, 12, 20));
        let sel = derive_roi(&image, &mask, 0.0);
        assert_eq!(sel.bbox, BoundingBox::new(3, 4, 12, 20));
        assert_eq!(sel.roi.dimensions(), (10, 17));
    }
}
