//! Validity-aware spatial median of a disparity map.

use crate::{Error, Result};
use depth_core::{Disparity, DisparityMap, INVALID_DISPARITY};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianConfig {
    pub enabled: bool,
    /// Odd window side length.
    pub kernel_size: usize,
}

impl Default for MedianConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 3,
        }
    }
}

impl MedianConfig {
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }
}

fn check_kernel(kernel_size: usize) -> Result<()> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(Error::invalid_parameters(format!(
            "median kernel size must be odd and non-zero, got {kernel_size}"
        )));
    }
    Ok(())
}

/// Median of the valid samples in the clipped window around `(x, y)`.
///
/// `samples` is scratch space reused across pixels.
fn median_at(
    input: &[i16],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    half: usize,
    min_count: usize,
    samples: &mut Vec<i16>,
) -> i16 {
    samples.clear();
    let y0 = y.saturating_sub(half);
    let y1 = (y + half).min(height - 1);
    let x0 = x.saturating_sub(half);
    let x1 = (x + half).min(width - 1);

    for row in input[y0 * width..(y1 + 1) * width].chunks_exact(width) {
        samples.extend(
            row[x0..=x1]
                .iter()
                .filter_map(|&d| Disparity::from_raw(d).valid()),
        );
    }

    if samples.len() < min_count {
        return INVALID_DISPARITY;
    }
    let mid = samples.len() / 2;
    let (_, median, _) = samples.select_nth_unstable(mid);
    *median
}

/// Spatial median over a `kernel_size x kernel_size` window, clipped at borders.
///
/// Invalid pixels pass through unchanged. A valid pixel whose window holds fewer
/// than `kernel_size^2 / 2` valid samples becomes invalid; otherwise it takes the
/// sample at sorted index `count / 2` (the upper middle for even counts).
pub fn median_filter(input: &DisparityMap, output: &mut DisparityMap, kernel_size: usize) -> Result<()> {
    check_kernel(kernel_size)?;
    if !input.same_shape(output) {
        return Err(Error::dimension_mismatch(format!(
            "median input is {}x{}, output is {}x{}",
            input.width, input.height, output.width, output.height
        )));
    }
    if input.is_empty() {
        return Ok(());
    }

    let width = input.width as usize;
    let height = input.height as usize;
    let half = kernel_size / 2;
    let min_count = kernel_size * kernel_size / 2;
    let src = &input.data;

    output
        .data
        .par_chunks_mut(width)
        .enumerate()
        .for_each_init(
            || Vec::with_capacity(kernel_size * kernel_size),
            |samples, (y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let d = src[y * width + x];
                    *out = if d > 0 {
                        median_at(src, width, height, x, y, half, min_count, samples)
                    } else {
                        d
                    };
                }
            },
        );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(width: u32, height: u32, data: &[i16]) -> DisparityMap {
        DisparityMap::from_raw(width, height, data.to_vec()).unwrap()
    }

    #[test]
    fn removes_outlier() {
        let mut data = vec![32i16; 25];
        data[12] = 400;
        let input = map(5, 5, &data);
        let mut out = DisparityMap::new(5, 5).unwrap();
        median_filter(&input, &mut out, 3).unwrap();
        assert_eq!(out.get(2, 2).raw(), 32);
    }

    #[test]
    fn invalid_pixels_pass_through() {
        let input = map(3, 1, &[-3, 0, -16]);
        let mut out = DisparityMap::filled(3, 1, 99).unwrap();
        median_filter(&input, &mut out, 3).unwrap();
        assert_eq!(out.data, vec![-3, 0, -16]);
    }

    #[test]
    fn sparse_window_becomes_invalid() {
        // Center valid, all 8 neighbours invalid: 1 < 9 / 2.
        let mut data = vec![-16i16; 9];
        data[4] = 50;
        let input = map(3, 3, &data);
        let mut out = DisparityMap::new(3, 3).unwrap();
        median_filter(&input, &mut out, 3).unwrap();
        assert_eq!(out.get(1, 1).raw(), INVALID_DISPARITY);
    }

    #[test]
    fn even_count_takes_upper_middle() {
        // Corner window of a 2x2 map with kernel 3 has 4 samples: {10, 20, 30, 40}.
        let input = map(2, 2, &[10, 20, 30, 40]);
        let mut out = DisparityMap::new(2, 2).unwrap();
        median_filter(&input, &mut out, 3).unwrap();
        assert!(out.data.iter().all(|&d| d == 30));
    }

    #[test]
    fn kernel_one_is_identity_on_valid() {
        let input = map(3, 2, &[5, -16, 7, 8, 0, 9]);
        let mut out = DisparityMap::new(3, 2).unwrap();
        median_filter(&input, &mut out, 1).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn output_values_come_from_window() {
        let data: Vec<i16> = (0..49).map(|i| if i % 5 == 0 { -16 } else { (i * 13 % 97) as i16 + 1 }).collect();
        let input = map(7, 7, &data);
        let mut out = DisparityMap::new(7, 7).unwrap();
        median_filter(&input, &mut out, 5).unwrap();
        for (&o, &i) in out.data.iter().zip(input.data.iter()) {
            assert!(o == INVALID_DISPARITY || o == i || data.contains(&o));
            assert!(!(o > -16 && o <= 0 && o != i));
        }
    }

    #[test]
    fn rejects_even_kernel_and_shape_mismatch() {
        let input = map(2, 2, &[1, 2, 3, 4]);
        let mut out = DisparityMap::new(2, 2).unwrap();
        assert!(median_filter(&input, &mut out, 4).is_err());
        assert!(median_filter(&input, &mut out, 0).is_err());
        let mut wrong = DisparityMap::new(3, 2).unwrap();
        assert!(median_filter(&input, &mut wrong, 3).is_err());
    }
}
