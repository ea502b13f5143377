//! Invalidate disparity where either rectified image is saturated.
//!
//! Specular highlights look identical from both cameras at the wrong depth, so
//! any pixel at or above `threshold` in the left or right image, grown by a
//! square margin of `radius`, is forced to the invalid sentinel.

use crate::{Error, Result};
use depth_core::{try_alloc, DisparityMap, ProcessingPath, INVALID_DISPARITY};
use depth_imgproc::dilate_into;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use wide::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecularConfig {
    pub enabled: bool,
    /// Intensity at or above which a pixel counts as saturated.
    pub threshold: u8,
    /// Chebyshev margin grown around saturated pixels; 0 disables growth.
    pub radius: u32,
}

impl Default for SpecularConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 250,
            radius: 2,
        }
    }
}

impl SpecularConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_radius(mut self, radius: u32) -> Self {
        self.radius = radius;
        self
    }
}

/// Set `mask[i] = 1` where `left[i] >= threshold || right[i] >= threshold`.
pub fn saturation_mask(left: &[u8], right: &[u8], mask: &mut [u8], threshold: u8, path: ProcessingPath) {
    match path {
        ProcessingPath::Scalar => saturation_mask_scalar(left, right, mask, threshold),
        ProcessingPath::Vectorized => saturation_mask_simd(left, right, mask, threshold),
    }
}

fn saturation_mask_scalar(left: &[u8], right: &[u8], mask: &mut [u8], threshold: u8) {
    for ((m, &l), &r) in mask.iter_mut().zip(left).zip(right) {
        *m = u8::from(l >= threshold || r >= threshold);
    }
}

fn saturation_mask_simd(left: &[u8], right: &[u8], mask: &mut [u8], threshold: u8) {
    let t = u8x16::splat(threshold);
    let one = u8x16::splat(1);

    let mut m_chunks = mask.chunks_exact_mut(16);
    let mut l_chunks = left.chunks_exact(16);
    let mut r_chunks = right.chunks_exact(16);

    for ((m, l), r) in (&mut m_chunks).zip(&mut l_chunks).zip(&mut r_chunks) {
        let mut la = [0u8; 16];
        let mut ra = [0u8; 16];
        la.copy_from_slice(l);
        ra.copy_from_slice(r);
        let lv = u8x16::from(la);
        let rv = u8x16::from(ra);
        // x >= t  <=>  max(x, t) == x
        let hit = lv.max(t).cmp_eq(lv) | rv.max(t).cmp_eq(rv);
        m.copy_from_slice(&(hit & one).to_array());
    }

    saturation_mask_scalar(
        l_chunks.remainder(),
        r_chunks.remainder(),
        m_chunks.into_remainder(),
        threshold,
    );
}

/// Overwrite saturated (and nearby) disparities with the invalid sentinel.
///
/// Returns the number of pixels under the final mask.
pub fn mask_specular(
    disparity: &mut DisparityMap,
    left: &GrayImage,
    right: &GrayImage,
    threshold: u8,
    radius: u32,
) -> Result<usize> {
    mask_specular_with(disparity, left, right, threshold, radius, ProcessingPath::default())
}

pub fn mask_specular_with(
    disparity: &mut DisparityMap,
    left: &GrayImage,
    right: &GrayImage,
    threshold: u8,
    radius: u32,
    path: ProcessingPath,
) -> Result<usize> {
    let (width, height) = (disparity.width, disparity.height);
    for (name, img) in [("left", left), ("right", right)] {
        if img.dimensions() != (width, height) {
            return Err(Error::dimension_mismatch(format!(
                "{name} image is {}x{}, disparity is {width}x{height}",
                img.width(),
                img.height()
            )));
        }
    }

    let mut mask = try_alloc(disparity.len(), 0u8)?;
    saturation_mask(left.as_raw(), right.as_raw(), &mut mask, threshold, path);

    let mask = if radius > 0 {
        let mut grown = try_alloc(disparity.len(), 0u8)?;
        dilate_into(&mask, &mut grown, width, height, radius)?;
        grown
    } else {
        mask
    };

    let mut masked = 0;
    for (d, &m) in disparity.data.iter_mut().zip(mask.iter()) {
        if m != 0 {
            *d = INVALID_DISPARITY;
            masked += 1;
        }
    }
    tracing::trace!(masked, threshold, radius, "specular mask applied");
    Ok(masked)
}
