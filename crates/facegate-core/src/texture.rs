//! Passive texture plausibility check on a face crop.
//!
//! A printed photograph or flat mask produces an unusually uniform luma
//! distribution; a screen replay adds moiré and sensor noise that push the
//! spread far above a real face. Live skin under normal lighting sits in
//! between.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Flat prints, uniformly lit masks, noisy screen replays.
//! - **Does not block:** High-quality prints under natural lighting, or any
//!   attack whose crop happens to fall inside the plausible band.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Lowest luma variance (exclusive) accepted as live skin texture.
pub const DEFAULT_MIN_VARIANCE: f64 = 300.0;
/// Highest luma variance (exclusive) accepted as live skin texture.
pub const DEFAULT_MAX_VARIANCE: f64 = 5000.0;

/// Exclusive variance band considered plausible for a live face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureBounds {
    pub min_variance: f64,
    pub max_variance: f64,
}

impl Default for TextureBounds {
    fn default() -> Self {
        Self {
            min_variance: DEFAULT_MIN_VARIANCE,
            max_variance: DEFAULT_MAX_VARIANCE,
        }
    }
}

/// Result of a texture check on one crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextureReport {
    /// Population variance of per-pixel luma.
    pub variance: f64,
    /// Whether the variance lies strictly inside the configured band.
    pub plausible: bool,
}

/// Integer Rec. 601 luma, truncated.
fn luma(r: u8, g: u8, b: u8) -> u32 {
    (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000
}

/// Population variance of the crop's luma. An empty crop has variance 0.
pub fn luma_variance(crop: &RgbImage) -> f64 {
    let count = u64::from(crop.width()) * u64::from(crop.height());
    if count == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_squares = 0.0f64;
    for pixel in crop.pixels() {
        let [r, g, b] = pixel.0;
        let y = f64::from(luma(r, g, b));
        sum += y;
        sum_squares += y * y;
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_squares / n - mean * mean).max(0.0)
}

pub fn analyze(crop: &RgbImage, bounds: &TextureBounds) -> TextureReport {
    let variance = luma_variance(crop);
    TextureReport {
        variance,
        plausible: variance > bounds.min_variance && variance < bounds.max_variance,
    }
}
