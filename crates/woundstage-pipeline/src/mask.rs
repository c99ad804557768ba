//! Binary wound masks and connected-component reduction.
//!
//! A [`Mask`] stores one byte per pixel at full image resolution:
//! `1` for wound foreground, `0` for background. Masks produced by the
//! segmentation stage hold at most one 8-connected foreground region.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::resize::FloatImage;
use crate::types::{BoundingBox, Dimensions};

/// Binary per-pixel wound mask (values 0 or 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Build a mask from a grayscale raster, treating any non-zero pixel
    /// as foreground.
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        let mut binary = image.clone();
        for p in binary.pixels_mut() {
            p.0[0] = u8::from(p.0[0] > 0);
        }
        Self(binary)
    }

    /// All-background mask of the given size.
    #[must_use]
    pub fn empty(dimensions: Dimensions) -> Self {
        Self(GrayImage::new(dimensions.width, dimensions.height))
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Whether pixel `(x, y)` is foreground.
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] > 0
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> u64 {
        self.0.pixels().map(|p| u64::from(p.0[0] > 0)).sum()
    }

    /// Returns `true` if no pixel is foreground.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.pixels().all(|p| p.0[0] == 0)
    }

    /// Foreground pixels divided by total pixels, in `[0, 1]`.
    ///
    /// Exactly `0.0` for an empty mask (including a zero-sized one).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn area_ratio(&self) -> f64 {
        let total = self.dimensions().pixel_count();
        if total == 0 {
            return 0.0;
        }
        self.foreground_count() as f64 / total as f64
    }

    /// Tight inclusive box around the foreground, or `None` if empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        for (x, y, p) in self.0.enumerate_pixels() {
            if p.0[0] == 0 {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox::new(x, y, x, y),
                Some(b) => BoundingBox::new(b.x1.min(x), b.y1.min(y), b.x2.max(x), b.y2.max(y)),
            });
        }
        bbox
    }

    /// The underlying 0/1 raster.
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }
}

/// Binarize a probability map: foreground where `p > threshold`.
#[must_use = "returns the raw binary mask"]
pub fn threshold(probabilities: &FloatImage, threshold: f32) -> Mask {
    let binary = GrayImage::from_fn(probabilities.width(), probabilities.height(), |x, y| {
        Luma([u8::from(probabilities.get_pixel(x, y).0[0] > threshold)])
    });
    Mask(binary)
}

/// Count the 8-connected foreground components in a mask.
#[must_use]
pub fn component_count(mask: &Mask) -> usize {
    let labels = connected_components(mask.as_gray(), Connectivity::Eight, Luma([0u8]));
    labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize
}

/// Keep only the largest 8-connected foreground component.
///
/// Components are labelled in raster order; on an area tie the
/// component whose first pixel comes first wins. A mask with zero or
/// one component is returned unchanged.
#[must_use = "returns the reduced mask"]
pub fn keep_largest_component(mask: &Mask) -> Mask {
    let labels = connected_components(mask.as_gray(), Connectivity::Eight, Luma([0u8]));
    let component_total = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    if component_total <= 1 {
        return mask.clone();
    }

    let mut areas = vec![0_u64; component_total + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }
    let mut largest = 1;
    for (label, &area) in areas.iter().enumerate().skip(2) {
        if area > areas[largest] {
            largest = label;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let largest = largest as u32;
    let reduced = GrayImage::from_fn(labels.width(), labels.height(), |x, y| {
        Luma([u8::from(labels.get_pixel(x, y).0[0] == largest)])
    });
    Mask(reduced)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Build a mask from ASCII art: `#` is foreground.
    fn mask_from_art(rows: &[&str]) -> Mask {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let gray = GrayImage::from_fn(width, height, |x, y| {
            Luma([u8::from(rows[y as usize].as_bytes()[x as usize] == b'#')])
        });
        Mask::from_gray(&gray)
    }

    #[test]
    fn from_gray_binarizes_to_zero_and_one() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[0, 7, 255][x as usize]]));
        let mask = Mask::from_gray(&gray);
        let values: Vec<u8> = mask.as_gray().pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 1, 1]);
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let probs = FloatImage::from_fn(3, 1, |x, _| Luma([[0.4, 0.5, 0.6][x as usize]]));
        let mask = threshold(&probs, 0.5);
        assert!(!mask.is_foreground(0, 0));
        assert!(!mask.is_foreground(1, 0));
        assert!(mask.is_foreground(2, 0));
    }

    #[test]
    fn largest_component_wins() {
        let mask = mask_from_art(&[
            "##.....",
            "##.....",
            "....###",
            "....###",
            "....###",
        ]);
        assert_eq!(component_count(&mask), 2);
        let reduced = keep_largest_component(&mask);
        assert_eq!(component_count(&reduced), 1);
        assert_eq!(reduced.foreground_count(), 9);
        assert!(!reduced.is_foreground(0, 0));
        assert!(reduced.is_foreground(6, 4));
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let mask = mask_from_art(&["#..", ".#.", "..#"]);
        assert_eq!(component_count(&mask), 1);
        assert_eq!(keep_largest_component(&mask), mask);
    }

    #[test]
    fn single_component_is_unchanged() {
        let mask = mask_from_art(&[".....", ".###.", ".#.#.", "....."]);
        assert_eq!(keep_largest_component(&mask), mask);
    }

    #[test]
    fn empty_mask_stays_empty() {
        let mask = Mask::empty(Dimensions {
            width: 8,
            height: 6,
        });
        let reduced = keep_largest_component(&mask);
        assert!(reduced.is_empty());
        assert_eq!(reduced.dimensions(), mask.dimensions());
        assert!(reduced.bounding_box().is_none());
        assert!((reduced.area_ratio() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn equal_areas_keep_first_in_raster_order() {
        let mask = mask_from_art(&["##..##", "......", "......"]);
        let reduced = keep_largest_component(&mask);
        assert!(reduced.is_foreground(0, 0));
        assert!(!reduced.is_foreground(4, 0));
    }

    #[test]
    fn reduction_is_idempotent_on_many_blobs() {
        let mask = mask_from_art(&[
            "#.#.#.#",
            ".......",
            "##...##",
            "##...#.",
            ".......",
            "###.#..",
        ]);
        let once = keep_largest_component(&mask);
        let twice = keep_largest_component(&once);
        assert!(component_count(&once) <= 1);
        assert_eq!(once, twice);
    }

    #[test]
    fn bounding_box_and_area_ratio() {
        let mask = mask_from_art(&["....", ".##.", ".#..", "...."]);
        assert_eq!(mask.bounding_box(), Some(BoundingBox::new(1, 1, 2, 2)));
        assert!((mask.area_ratio() - 3.0 / 16.0).abs() < 1e-12);
    }
}
