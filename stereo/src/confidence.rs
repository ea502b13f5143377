//! Per-pixel confidence from image texture and local disparity noise.
//!
//! The score starts from the Sobel gradient strength of the left image, has a
//! penalty proportional to the variance of nearby valid disparities removed,
//! and is forced to zero wherever the disparity itself is invalid.

use crate::{Error, Result};
use depth_core::{ConfidenceMap, Disparity, DisparityMap, SUBPIXEL_SCALE};
use depth_imgproc::{apply_heat_colormap, sobel_magnitude};
use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Multiplier from `|gx| + |gy|` to score units.
    pub texture_gain: f32,
    /// Score units removed per square pixel of disparity variance.
    pub variance_weight: f32,
    /// Radius of the square window used for the variance.
    pub variance_radius: u32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            texture_gain: 0.5,
            variance_weight: 32.0,
            variance_radius: 1,
        }
    }
}

impl ConfidenceConfig {
    pub fn with_texture_gain(mut self, gain: f32) -> Self {
        self.texture_gain = gain;
        self
    }

    pub fn with_variance_weight(mut self, weight: f32) -> Self {
        self.variance_weight = weight;
        self
    }

    pub fn with_variance_radius(mut self, radius: u32) -> Self {
        self.variance_radius = radius;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.texture_gain.is_finite() && self.texture_gain >= 0.0) {
            return Err(Error::invalid_parameters(format!(
                "texture_gain must be finite and >= 0, got {}",
                self.texture_gain
            )));
        }
        if !(self.variance_weight.is_finite() && self.variance_weight >= 0.0) {
            return Err(Error::invalid_parameters(format!(
                "variance_weight must be finite and >= 0, got {}",
                self.variance_weight
            )));
        }
        Ok(())
    }
}

/// Variance, in square pixels, of the valid disparities within `radius` of `(x, y)`.
fn local_variance(disp: &[i16], width: usize, height: usize, x: usize, y: usize, radius: usize) -> f32 {
    let y0 = y.saturating_sub(radius);
    let y1 = (y + radius).min(height - 1);
    let x0 = x.saturating_sub(radius);
    let x1 = (x + radius).min(width - 1);

    let window = || {
        disp[y0 * width..(y1 + 1) * width]
            .chunks_exact(width)
            .flat_map(move |row| row[x0..=x1].iter().filter_map(|&d| Disparity::from_raw(d).valid()))
    };

    let (n, sum) = window().fold((0u64, 0i64), |(n, sum), v| (n + 1, sum + v as i64));
    if n < 2 {
        return 0.0;
    }
    // Second pass over deviations keeps the result non-negative for any window size.
    let mean = sum as f64 / n as f64;
    let scaled = window()
        .map(|v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let q = SUBPIXEL_SCALE as f64;
    (scaled / (q * q)) as f32
}

/// Combine texture and disparity noise into a score for a single valid pixel.
#[inline]
pub fn score(gradient: u16, variance: f32, config: &ConfidenceConfig) -> u8 {
    let texture = (gradient as f32 * config.texture_gain).min(255.0);
    let penalty = variance.max(0.0) * config.variance_weight;
    (texture - penalty).clamp(0.0, 255.0) as u8
}

/// Confidence for every pixel of `disparity`, using `left_gray` for texture.
pub fn compute_confidence(
    disparity: &DisparityMap,
    left_gray: &GrayImage,
    config: &ConfidenceConfig,
) -> Result<ConfidenceMap> {
    config.validate()?;
    if left_gray.dimensions() != (disparity.width, disparity.height) {
        return Err(Error::dimension_mismatch(format!(
            "left image is {}x{}, disparity is {}x{}",
            left_gray.width(),
            left_gray.height(),
            disparity.width,
            disparity.height
        )));
    }

    let mut confidence = ConfidenceMap::new(disparity.width, disparity.height)?;
    if disparity.is_empty() {
        return Ok(confidence);
    }
    let gradient = sobel_magnitude(left_gray)?;

    let width = disparity.width as usize;
    let height = disparity.height as usize;
    let radius = config.variance_radius as usize;
    let disp = &disparity.data;

    confidence
        .data
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let i = y * width + x;
                *out = if disp[i] > 0 {
                    let variance = local_variance(disp, width, height, x, y, radius);
                    score(gradient[i], variance, config)
                } else {
                    0
                };
            }
        });

    Ok(confidence)
}

/// Render a confidence map through the blue-to-red heat gradient.
pub fn colorize(confidence: &ConfidenceMap) -> Result<RgbImage> {
    apply_heat_colormap(&confidence.data, confidence.width, confidence.height)
}
