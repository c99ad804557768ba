//! Resampling for model inputs and model outputs.
//!
//! Two interpolations are needed and neither maps cleanly onto the
//! `image` crate's filters:
//!
//! - [`resize_area`] shrinks photographs to the model's square input by
//!   averaging every source pixel that overlaps an output pixel, weighted
//!   by the overlap. This is the pixel-area relation used by the models'
//!   training pipeline. Enlarging falls back to bilinear
//!   ([`FilterType::Triangle`]).
//! - [`resize_bilinear`] brings the probability map back to full image
//!   resolution using half-pixel-centred bilinear sampling.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, RgbImage};

/// A single-channel `f32` raster, used for per-pixel probabilities.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// One source contribution to an output pixel along a single axis.
#[derive(Debug, Clone, Copy)]
struct Tap {
    index: usize,
    weight: f32,
}

/// Per-output-pixel source taps for an area-averaging resize along
/// one axis. Weights for each output pixel sum to 1.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn area_taps(src_len: u32, dst_len: u32) -> Vec<Vec<Tap>> {
    let scale = f64::from(src_len) / f64::from(dst_len);
    (0..dst_len)
        .map(|o| {
            let start = f64::from(o) * scale;
            let end = (start + scale).min(f64::from(src_len));
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len as usize);
            (first..last)
                .filter_map(|i| {
                    let overlap = end.min(i as f64 + 1.0) - start.max(i as f64);
                    (overlap > 0.0).then(|| Tap {
                        index: i,
                        weight: (overlap / scale) as f32,
                    })
                })
                .collect()
        })
        .collect()
}

/// Resize an RGB image with pixel-area averaging.
///
/// When both target dimensions are at most the source dimensions each
/// output pixel is the overlap-weighted mean of the source pixels it
/// covers. Otherwise the image is resampled bilinearly. A same-size
/// request returns an identical copy.
#[must_use = "returns the resized image"]
pub fn resize_area(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    if (src_w, src_h) == (width, height) {
        return image.clone();
    }
    if width > src_w || height > src_h {
        return imageops::resize(image, width, height, FilterType::Triangle);
    }

    let x_taps = area_taps(src_w, width);
    let y_taps = area_taps(src_h, height);

    // Horizontal pass into a float buffer of src_h rows x width columns.
    let row_len = width as usize * 3;
    let mut horizontal = vec![0.0_f32; src_h as usize * row_len];
    for (y, row) in image.rows().enumerate() {
        let pixels: Vec<[u8; 3]> = row.map(|p| p.0).collect();
        for (ox, taps) in x_taps.iter().enumerate() {
            let out = &mut horizontal[y * row_len + ox * 3..y * row_len + ox * 3 + 3];
            for tap in taps {
                for (c, value) in out.iter_mut().enumerate() {
                    *value += f32::from(pixels[tap.index][c]) * tap.weight;
                }
            }
        }
    }

    // Vertical pass.
    let mut output = RgbImage::new(width, height);
    for (oy, taps) in y_taps.iter().enumerate() {
        for ox in 0..width as usize {
            let mut acc = [0.0_f32; 3];
            for tap in taps {
                let base = tap.index * row_len + ox * 3;
                for (c, value) in acc.iter_mut().enumerate() {
                    *value += horizontal[base + c] * tap.weight;
                }
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let px = acc.map(|v| v.round().clamp(0.0, 255.0) as u8);
            #[allow(clippy::cast_possible_truncation)]
            output.put_pixel(ox as u32, oy as u32, image::Rgb(px));
        }
    }
    output
}

/// Source sample position and blend weight for bilinear interpolation
/// along one axis, using half-pixel centres and edge clamping.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bilinear_coords(dst: u32, scale: f32, src_len: u32) -> (u32, u32, f32) {
    let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let lo = (pos.floor() as u32).min(src_len - 1);
    let hi = (lo + 1).min(src_len - 1);
    let frac = if lo == src_len - 1 { 0.0 } else { pos - lo as f32 };
    (lo, hi, frac)
}

/// Resize a float raster with bilinear interpolation.
///
/// Output pixel centres map to `(dst + 0.5) * scale - 0.5` in source
/// coordinates, clamped at the borders. Values stay within the range of
/// the input, so a probability map stays in `[0, 1]`.
#[must_use = "returns the resized raster"]
#[allow(clippy::cast_precision_loss)]
pub fn resize_bilinear(map: &FloatImage, width: u32, height: u32) -> FloatImage {
    let (src_w, src_h) = map.dimensions();
    if (src_w, src_h) == (width, height) {
        return map.clone();
    }
    if src_w == 0 || src_h == 0 {
        return FloatImage::new(width, height);
    }

    let scale_x = src_w as f32 / width as f32;
    let scale_y = src_h as f32 / height as f32;
    let columns: Vec<(u32, u32, f32)> = (0..width)
        .map(|x| bilinear_coords(x, scale_x, src_w))
        .collect();

    let mut output = FloatImage::new(width, height);
    for y in 0..height {
        let (y0, y1, fy) = bilinear_coords(y, scale_y, src_h);
        for (x, &(x0, x1, fx)) in (0..width).zip(&columns) {
            let top = map.get_pixel(x0, y0).0[0].mul_add(1.0 - fx, map.get_pixel(x1, y0).0[0] * fx);
            let bottom =
                map.get_pixel(x0, y1).0[0].mul_add(1.0 - fx, map.get_pixel(x1, y1).0[0] * fx);
            output.put_pixel(x, y, Luma([top.mul_add(1.0 - fy, bottom * fy)]));
        }
    }
    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn area_taps_sum_to_one() {
        for (src, dst) in [(10, 3), (512, 320), (7, 7), (1000, 384)] {
            for taps in area_taps(src, dst) {
                let sum: f32 = taps.iter().map(|t| t.weight).sum();
                assert!((sum - 1.0).abs() < 1e-4, "{src}->{dst}: weights sum to {sum}");
            }
        }
    }

    #[test]
    fn area_halving_averages_blocks() {
        // 4x2 image: left 2x2 block is 0/100, right 2x2 block is 200.
        let img = RgbImage::from_fn(4, 2, |x, y| {
            let v = match (x, y) {
                (0, 0) | (1, 1) => 0,
                (0, 1) | (1, 0) => 100,
                _ => 200,
            };
            image::Rgb([v, v, v])
        });
        let out = resize_area(&img, 2, 1);
        assert_eq!(out.dimensions(), (2, 1));
        assert_eq!(out.get_pixel(0, 0).0, [50, 50, 50]);
        assert_eq!(out.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn area_resize_preserves_uniform_color() {
        let img = RgbImage::from_pixel(37, 23, image::Rgb([12, 140, 250]));
        let out = resize_area(&img, 16, 16);
        assert!(out.pixels().all(|p| p.0 == [12, 140, 250]));
    }

    #[test]
    fn area_same_size_is_identity() {
        let img = RgbImage::from_fn(9, 5, |x, y| image::Rgb([x as u8, y as u8, 3]));
        assert_eq!(resize_area(&img, 9, 5).as_raw(), img.as_raw());
    }

    #[test]
    fn area_enlarging_uses_requested_size() {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([90, 90, 90]));
        let out = resize_area(&img, 10, 6);
        assert_eq!(out.dimensions(), (10, 6));
        assert!(out.pixels().all(|p| p.0 == [90, 90, 90]));
    }

    #[test]
    fn bilinear_same_size_is_identity() {
        let map = FloatImage::from_fn(6, 4, |x, y| Luma([(x + y) as f32 / 10.0]));
        let out = resize_bilinear(&map, 6, 4);
        assert_eq!(out.as_raw(), map.as_raw());
    }

    #[test]
    fn bilinear_doubling_interpolates_between_samples() {
        let map = FloatImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0.0 } else { 1.0 }]));
        let out = resize_bilinear(&map, 4, 1);
        let values: Vec<f32> = out.pixels().map(|p| p.0[0]).collect();
        // Centres map to -0.25 (clamped to 0), 0.25, 0.75, 1.25 (clamped).
        let expected = [0.0, 0.25, 0.75, 1.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "got {values:?}");
        }
    }

    #[test]
    fn bilinear_output_stays_within_input_range() {
        let map = FloatImage::from_fn(5, 5, |x, y| Luma([((x * 7 + y * 3) % 5) as f32 / 4.0]));
        let out = resize_bilinear(&map, 23, 11);
        assert_eq!(out.dimensions(), (23, 11));
        assert!(out.pixels().all(|p| (0.0..=1.0).contains(&p.0[0])));
    }
}
