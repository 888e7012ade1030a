//! Lightweight image fingerprints
//!
//! Two fixed-length vectors describe a crop:
//! - the *fingerprint*: raw RGB intensities of a 32x32 downsample in raster
//!   order, sensitive to spatial layout and fine art differences
//! - the *histogram*: hue ∥ saturation ∥ value distributions, each normalised
//!   on its own, robust to brightness shifts
//!
//! Calibration and detection both go through [`SlotFeatures::extract`] so the
//! two sides always compare vectors produced by the same pipeline.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use imageproc::map::map_colors;

/// Side length of the downsample grid.
pub const GRID_SIZE: u32 = 32;
/// Colour channels sampled per grid cell.
pub const CHANNELS: usize = 3;
/// Length of every fingerprint vector.
pub const FINGERPRINT_LEN: usize = CHANNELS * (GRID_SIZE * GRID_SIZE) as usize;

/// Saturation bins. Hue is sampled at twice this resolution; every
/// sub-histogram still sums to 1, so nearby hues separate more finely but
/// hue carries the same total weight as saturation and value.
pub const SAT_BINS: usize = 8;
pub const HUE_BINS: usize = SAT_BINS * 2;
pub const VAL_BINS: usize = 8;
/// Length of every histogram vector.
pub const HISTOGRAM_LEN: usize = HUE_BINS + SAT_BINS + VAL_BINS;

/// Pixels whose max-min channel spread (0..1 scale) is at or below this are
/// treated as grey and excluded from the hue/saturation sub-histograms.
pub const CHROMA_EPSILON: f32 = 0.02;

/// Fingerprint and histogram of one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotFeatures {
    pub fingerprint: Vec<f32>,
    pub histogram: Vec<f32>,
}

impl SlotFeatures {
    pub fn extract(image: &RgbImage) -> Self {
        let grid = downsample(image);
        Self {
            fingerprint: fingerprint_of_grid(&grid),
            histogram: histogram_of_grid(&grid),
        }
    }
}

fn downsample(image: &RgbImage) -> RgbImage {
    if image.dimensions() == (GRID_SIZE, GRID_SIZE) {
        return image.clone();
    }
    imageops::resize(image, GRID_SIZE, GRID_SIZE, FilterType::Triangle)
}

/// Raw per-channel intensities (scaled to 0..1) of the downsampled crop
pub fn fingerprint(image: &RgbImage) -> Vec<f32> {
    fingerprint_of_grid(&downsample(image))
}

fn fingerprint_of_grid(grid: &RgbImage) -> Vec<f32> {
    let mut out = Vec::with_capacity(FINGERPRINT_LEN);
    for pixel in grid.pixels() {
        out.extend(pixel.0.iter().map(|&c| c as f32 / 255.0));
    }
    out
}

/// Hue ∥ saturation ∥ value histogram of the downsampled crop
pub fn histogram(image: &RgbImage) -> Vec<f32> {
    histogram_of_grid(&downsample(image))
}

fn histogram_of_grid(grid: &RgbImage) -> Vec<f32> {
    let mut hue = [0f32; HUE_BINS];
    let mut sat = [0f32; SAT_BINS];
    let mut val = [0f32; VAL_BINS];

    for pixel in grid.pixels() {
        let (h, s, v, chroma) = rgb_to_hsv(pixel);
        if chroma > CHROMA_EPSILON {
            hue[bin(h / 360.0, HUE_BINS)] += 1.0;
            sat[bin(s, SAT_BINS)] += 1.0;
        }
        val[bin(v, VAL_BINS)] += 1.0;
    }

    normalize(&mut hue);
    normalize(&mut sat);
    normalize(&mut val);

    let mut out = Vec::with_capacity(HISTOGRAM_LEN);
    out.extend_from_slice(&hue);
    out.extend_from_slice(&sat);
    out.extend_from_slice(&val);
    out
}

fn bin(fraction: f32, bins: usize) -> usize {
    ((fraction * bins as f32) as usize).min(bins - 1)
}

fn normalize(counts: &mut [f32]) {
    let total: f32 = counts.iter().sum();
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
}

/// Returns (hue in degrees, saturation, value, chroma), all but hue in 0..1.
fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32, f32) {
    let r = pixel[0] as f32 / 255.0;
    let g = pixel[1] as f32 / 255.0;
    let b = pixel[2] as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;

    let hue = if chroma <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / chroma).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / chroma + 2.0)
    } else {
        60.0 * ((r - g) / chroma + 4.0)
    };
    let saturation = if max > 0.0 { chroma / max } else { 0.0 };

    (hue, saturation, max, chroma)
}

/// Cosine similarity. Zero-magnitude vectors and length mismatches score 0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() { sim as f32 } else { 0.0 }
}

fn luma(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Blend every pixel toward its luma grey. `amount` is clamped to 0..1.
pub fn desaturate(image: &RgbImage, amount: f32) -> RgbImage {
    let amount = if amount.is_finite() {
        amount.clamp(0.0, 1.0)
    } else {
        0.0
    };
    map_colors(image, |pixel| {
        let grey = luma(&pixel);
        Rgb(pixel.0.map(|c| {
            let c = c as f32;
            (c + (grey - c) * amount).round().clamp(0.0, 255.0) as u8
        }))
    })
}

/// Alpha-composite onto an opaque background colour.
///
/// The live slots sit on a dark backdrop, so references must be flattened
/// onto a dark colour too: transparent corners composited onto white turn
/// pale and make pale-palette items match everything.
pub fn composite_on_background(image: &RgbaImage, background: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y);
        let alpha = px[3] as f32 / 255.0;
        Rgb(std::array::from_fn(|i| {
            let fg = px[i] as f32;
            let bg = background[i] as f32;
            (fg * alpha + bg * (1.0 - alpha)).round() as u8
        }))
    })
}
