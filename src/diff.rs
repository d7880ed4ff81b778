//! Perceptual pixel comparison.
//!
//! Each pixel pair is compared in YIQ space after blending alpha against
//! white. A pair counts as different when its weighted distance exceeds
//! `35215 * threshold^2`, where 35215 is the largest possible distance (black
//! vs white), so `threshold` reads as a fraction of the full scale.
//!
//! Pixels that exceed the threshold but sit on an anti-aliased edge in either
//! image are not counted unless [`DiffOptions::include_antialiasing`] is set.
//! They are painted with the anti-aliasing colour instead, so they remain
//! visible in the overlay.

use image::Rgba;
use thiserror::Error;

use crate::codec::PixelBuffer;

/// Largest YIQ distance between two opaque colours
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Tuning for a comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffOptions {
    /// Normalized 0.0-1.0 distance above which a pixel differs
    pub threshold: f64,
    /// Count anti-aliased pixels as differences
    pub include_antialiasing: bool,
    /// Overlay colour for differing pixels
    pub diff_color: [u8; 4],
    /// Overlay colour for pixels discounted as anti-aliasing
    pub aa_color: [u8; 4],
    /// Opacity (0.0-1.0) of unchanged pixels in the overlay
    pub background_alpha: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threshold: crate::config::DEFAULT_THRESHOLD,
            include_antialiasing: false,
            diff_color: [255, 0, 0, 255],
            aa_color: [255, 255, 0, 255],
            background_alpha: 0.0,
        }
    }
}

impl DiffOptions {
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn include_antialiasing(mut self, include: bool) -> Self {
        self.include_antialiasing = include;
        self
    }

    pub fn diff_color(mut self, color: [u8; 4]) -> Self {
        self.diff_color = color;
        self
    }

    pub fn background_alpha(mut self, alpha: f64) -> Self {
        self.background_alpha = alpha;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// The buffers cannot be aligned pixel for pixel
    #[error("Dimension mismatch: baseline {}x{}, current {}x{}", baseline.0, baseline.1, current.0, current.1)]
    DimensionMismatch {
        baseline: (u32, u32),
        current: (u32, u32),
    },
}

/// Output of a comparison
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Pixels over the threshold (anti-aliasing excluded unless included)
    pub differing_pixels: u64,
    /// Pixels over the threshold that were discounted as anti-aliasing
    pub antialiased_pixels: u64,
    /// width * height
    pub total_pixels: u64,
    /// differing / total * 100, rounded to two decimals
    pub mismatch_percentage: f64,
    /// Overlay with the same dimensions as the inputs
    pub highlight: PixelBuffer,
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        self.differing_pixels == 0
    }
}

/// `differing / total * 100`, rounded to two decimal places. Empty images score 0.
pub fn mismatch_percentage(differing: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = differing as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Compare `current` against `baseline`.
pub fn compare(baseline: &PixelBuffer, current: &PixelBuffer, options: &DiffOptions) -> Result<Comparison, DiffError> {
    if baseline.dimensions() != current.dimensions() {
        return Err(DiffError::DimensionMismatch {
            baseline: baseline.dimensions(),
            current: current.dimensions(),
        });
    }

    let (width, height) = baseline.dimensions();
    let total_pixels = u64::from(width) * u64::from(height);
    let background_alpha = (options.background_alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    let mut highlight = PixelBuffer::new(width, height);

    if baseline.as_raw() == current.as_raw() {
        for (x, y, px) in highlight.enumerate_pixels_mut() {
            *px = gray_pixel(baseline.get_pixel(x, y).0, background_alpha);
        }
        return Ok(Comparison {
            differing_pixels: 0,
            antialiased_pixels: 0,
            total_pixels,
            mismatch_percentage: 0.0,
            highlight,
        });
    }

    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
    let mut differing_pixels = 0u64;
    let mut antialiased_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let before = baseline.get_pixel(x, y).0;
            let after = current.get_pixel(x, y).0;
            let delta = color_delta(before, after, false);

            let out = if delta > max_delta {
                let is_aa = !options.include_antialiasing
                    && (antialiased(baseline, x, y, current) || antialiased(current, x, y, baseline));
                if is_aa {
                    antialiased_pixels += 1;
                    Rgba(options.aa_color)
                } else {
                    differing_pixels += 1;
                    Rgba(options.diff_color)
                }
            } else {
                gray_pixel(before, background_alpha)
            };
            highlight.put_pixel(x, y, out);
        }
    }

    Ok(Comparison {
        differing_pixels,
        antialiased_pixels,
        total_pixels,
        mismatch_percentage: mismatch_percentage(differing_pixels, total_pixels),
        highlight,
    })
}

fn gray_pixel(px: [u8; 4], alpha: u8) -> Rgba<u8> {
    let [r, g, b] = blend_white(px);
    let luma = rgb2y(r, g, b).round().clamp(0.0, 255.0) as u8;
    Rgba([luma, luma, luma, alpha])
}

fn blend_white(px: [u8; 4]) -> [f64; 3] {
    let [r, g, b, a] = px;
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    if a == 255 {
        return [r, g, b];
    }
    let a = f64::from(a) / 255.0;
    [255.0 + (r - 255.0) * a, 255.0 + (g - 255.0) * a, 255.0 + (b - 255.0) * a]
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

/// Weighted YIQ distance. With `y_only`, the signed brightness difference
/// `y(p1) - y(p2)` is returned instead.
fn color_delta(p1: [u8; 4], p2: [u8; 4], y_only: bool) -> f64 {
    if p1 == p2 {
        return 0.0;
    }
    let [r1, g1, b1] = blend_white(p1);
    let [r2, g2, b2] = blend_white(p2);

    let y = rgb2y(r1, g1, b1) - rgb2y(r2, g2, b2);
    if y_only {
        return y;
    }
    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q
}

/// Inclusive 3x3 neighbourhood bounds around (x, y), clipped to the image
fn neighbourhood(x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

/// Whether (x, y) in `img` looks like an anti-aliased edge pixel: it has at
/// most two identical neighbours, both a darker and a brighter neighbour, and
/// the darkest or brightest neighbour sits in a flat region of both images.
fn antialiased(img: &PixelBuffer, x: u32, y: u32, other: &PixelBuffer) -> bool {
    let (width, height) = img.dimensions();
    let (x0, y0, x2, y2) = neighbourhood(x, y, width, height);
    let center = img.get_pixel(x, y).0;

    // pixels on the image border get one free "equal neighbour"
    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let mut darkest = (x, y);
    let mut brightest = (x, y);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            let delta = color_delta(center, img.get_pixel(nx, ny).0, true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                darkest = (nx, ny);
            } else if delta > max {
                max = delta;
                brightest = (nx, ny);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, darkest.0, darkest.1) && has_many_siblings(other, darkest.0, darkest.1))
        || (has_many_siblings(img, brightest.0, brightest.1) && has_many_siblings(other, brightest.0, brightest.1))
}

/// Whether (x, y) has more than two neighbours of exactly the same colour
fn has_many_siblings(img: &PixelBuffer, x: u32, y: u32) -> bool {
    let (width, height) = img.dimensions();
    let (x0, y0, x2, y2) = neighbourhood(x, y, width, height);
    let center = img.get_pixel(x, y).0;

    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);
    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            if img.get_pixel(nx, ny).0 == center {
                zeroes += 1;
                if zeroes > 2 {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> PixelBuffer {
        PixelBuffer::from_pixel(w, h, Rgba(rgba))
    }

    fn highlighted(cmp: &Comparison, color: [u8; 4]) -> Vec<(u32, u32)> {
        cmp.highlight
            .enumerate_pixels()
            .filter(|(_, _, px)| px.0 == color)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_identical_images_match() {
        let img = solid(16, 9, [30, 60, 90, 255]);
        let cmp = compare(&img, &img.clone(), &DiffOptions::default()).unwrap();

        assert!(cmp.is_match());
        assert_eq!(cmp.differing_pixels, 0);
        assert_eq!(cmp.mismatch_percentage, 0.0);
        assert_eq!(cmp.total_pixels, 144);
        assert!(highlighted(&cmp, RED).is_empty());
        // unchanged pixels are fully transparent by default
        assert!(cmp.highlight.pixels().all(|px| px.0[3] == 0));
    }

    #[test]
    fn test_single_pixel_difference() {
        let base = solid(10, 10, WHITE);
        let mut cur = base.clone();
        cur.put_pixel(4, 6, Rgba(BLACK));

        let cmp = compare(&base, &cur, &DiffOptions::default()).unwrap();
        assert_eq!(cmp.differing_pixels, 1);
        assert_eq!(cmp.antialiased_pixels, 0);
        assert_eq!(cmp.mismatch_percentage, 1.0);
        assert!(!cmp.is_match());
        assert_eq!(highlighted(&cmp, RED), vec![(4, 6)]);
    }

    #[test]
    fn test_sub_threshold_change_ignored() {
        let base = solid(8, 8, [200, 200, 200, 255]);
        let mut cur = base.clone();
        cur.put_pixel(2, 2, Rgba([195, 195, 195, 255]));

        let cmp = compare(&base, &cur, &DiffOptions::default()).unwrap();
        assert!(cmp.is_match());

        // the same change is caught with a zero threshold
        let strict = compare(&base, &cur, &DiffOptions::default().threshold(0.0)).unwrap();
        assert_eq!(strict.differing_pixels, 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = compare(&solid(4, 4, WHITE), &solid(4, 5, WHITE), &DiffOptions::default()).unwrap_err();
        assert_eq!(
            err,
            DiffError::DimensionMismatch {
                baseline: (4, 4),
                current: (4, 5)
            }
        );
        assert_eq!(err.to_string(), "Dimension mismatch: baseline 4x4, current 4x5");
    }

    #[test]
    fn test_antialiased_edge_discounted() {
        // black | gray edge column | white, the edge shade changes between runs
        let edge = |shade: u8| {
            let mut img = solid(10, 6, WHITE);
            for y in 0..6 {
                for x in 0..5 {
                    img.put_pixel(x, y, Rgba(BLACK));
                }
                img.put_pixel(5, y, Rgba([shade, shade, shade, 255]));
            }
            img
        };
        let base = edge(128);
        let cur = edge(60);

        let cmp = compare(&base, &cur, &DiffOptions::default()).unwrap();
        assert_eq!(cmp.differing_pixels, 0);
        assert_eq!(cmp.antialiased_pixels, 6);
        assert_eq!(highlighted(&cmp, [255, 255, 0, 255]).len(), 6);

        let counted = compare(&base, &cur, &DiffOptions::default().include_antialiasing(true)).unwrap();
        assert_eq!(counted.differing_pixels, 6);
        assert_eq!(counted.antialiased_pixels, 0);
    }

    #[test]
    fn test_block_difference_percentage_and_coordinates() {
        let base = solid(40, 25, WHITE);
        let mut cur = base.clone();
        let mut expected = Vec::new();
        for y in 10..15 {
            for x in 20..30 {
                cur.put_pixel(x, y, Rgba([20, 40, 200, 255]));
                expected.push((x, y));
            }
        }

        let cmp = compare(&base, &cur, &DiffOptions::default()).unwrap();
        assert_eq!(cmp.differing_pixels, 50);
        assert_eq!(cmp.mismatch_percentage, 5.0);

        let mut got = highlighted(&cmp, RED);
        got.sort_by_key(|&(x, y)| (y, x));
        expected.sort_by_key(|&(x, y)| (y, x));
        assert_eq!(got, expected);
    }

    #[test]
    fn test_percentage_rounding_and_monotonicity() {
        assert_eq!(mismatch_percentage(1, 3), 33.33);
        assert_eq!(mismatch_percentage(2, 3), 66.67);
        assert_eq!(mismatch_percentage(0, 0), 0.0);

        let total = 997;
        let mut last = 0.0;
        for n in 0..=total {
            let pct = mismatch_percentage(n, total);
            assert!(pct >= last, "{n}: {pct} < {last}");
            assert!((0.0..=100.0).contains(&pct));
            last = pct;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_custom_colors_and_background() {
        let base = solid(3, 3, WHITE);
        let mut cur = base.clone();
        cur.put_pixel(1, 1, Rgba(BLACK));

        let options = DiffOptions::default().diff_color([0, 0, 255, 255]).background_alpha(1.0);
        let cmp = compare(&base, &cur, &options).unwrap();
        assert_eq!(cmp.highlight.get_pixel(1, 1).0, [0, 0, 255, 255]);
        assert_eq!(cmp.highlight.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_transparent_pixels_blend_against_white() {
        let base = solid(2, 2, WHITE);
        let cur = solid(2, 2, [0, 0, 0, 0]);
        let cmp = compare(&base, &cur, &DiffOptions::default().threshold(0.0)).unwrap();
        assert!(cmp.is_match());
    }
}
