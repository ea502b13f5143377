//! Morphological cleanup of the disparity validity mask.
//!
//! Closing fills small invalid holes inside valid regions; opening removes
//! small isolated valid specks. Filled holes receive the truncated mean of the
//! originally valid neighbours, removed specks receive the invalid sentinel, and
//! every other pixel keeps its exact input value.

use crate::Result;
use depth_core::{try_clone_slice, DisparityMap, Disparity, INVALID_DISPARITY};
use depth_imgproc::{dilate, erode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    pub enabled: bool,
    /// Closing radius; 0 skips closing.
    pub close_radius: u32,
    /// Opening radius; 0 skips opening.
    pub open_radius: u32,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            close_radius: 1,
            open_radius: 1,
        }
    }
}

impl MorphConfig {
    pub fn with_radii(mut self, close_radius: u32, open_radius: u32) -> Self {
        self.close_radius = close_radius;
        self.open_radius = open_radius;
        self
    }
}

/// Truncated mean of the valid samples within `radius` of `(x, y)`, if any.
fn neighbour_mean(original: &[i16], width: usize, height: usize, x: usize, y: usize, radius: usize) -> Option<i16> {
    let y0 = y.saturating_sub(radius);
    let y1 = (y + radius).min(height - 1);
    let x0 = x.saturating_sub(radius);
    let x1 = (x + radius).min(width - 1);

    let mut sum = 0i64;
    let mut count = 0i64;
    for row in original[y0 * width..(y1 + 1) * width].chunks_exact(width) {
        for v in row[x0..=x1].iter().filter_map(|&d| Disparity::from_raw(d).valid()) {
            sum += v as i64;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some((sum / count) as i16)
    }
}

/// Close then open the validity mask of `disparity` in place.
///
/// Returns `(filled, removed)`: how many pixels became valid and invalid.
pub fn morph_cleanup(disparity: &mut DisparityMap, close_radius: u32, open_radius: u32) -> Result<(usize, usize)> {
    if close_radius == 0 && open_radius == 0 {
        return Ok((0, 0));
    }
    if disparity.is_empty() {
        return Ok((0, 0));
    }

    let valid_old = disparity.validity_mask()?;
    let closed = if close_radius > 0 {
        Some(erode(&dilate(&valid_old, close_radius)?, close_radius)?)
    } else {
        None
    };
    let opened = if open_radius > 0 {
        let src = closed.as_ref().unwrap_or(&valid_old);
        Some(dilate(&erode(src, open_radius)?, open_radius)?)
    } else {
        None
    };
    let valid_new = opened.as_ref().or(closed.as_ref()).unwrap_or(&valid_old);

    let original = try_clone_slice(&disparity.data)?;
    let width = disparity.width as usize;
    let height = disparity.height as usize;
    // Hole values come from the closing neighbourhood, or the 3x3 one when only opening ran.
    let fill_radius = close_radius.max(1) as usize;

    let (filled, removed) = disparity
        .data
        .par_chunks_mut(width)
        .enumerate()
        .map(|(y, row)| {
            let mut filled = 0usize;
            let mut removed = 0usize;
            for (x, out) in row.iter_mut().enumerate() {
                let i = y * width + x;
                match (valid_old.data[i] != 0, valid_new.data[i] != 0) {
                    (false, true) => {
                        match neighbour_mean(&original, width, height, x, y, fill_radius) {
                            Some(mean) => {
                                *out = mean;
                                filled += 1;
                            }
                            None => *out = INVALID_DISPARITY,
                        }
                    }
                    (true, false) => {
                        *out = INVALID_DISPARITY;
                        removed += 1;
                    }
                    _ => {}
                }
            }
            (filled, removed)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    tracing::trace!(filled, removed, close_radius, open_radius, "morphological cleanup");
    Ok((filled, removed))
}
