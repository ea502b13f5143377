//! Depth estimation from disparity maps
//!
//! Convert Q4.4 disparities to metric depth with the rectified pinhole model.

use depth_core::{Disparity, DisparityMap};
use serde::{Deserialize, Serialize};

/// Rectified stereo rig parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoParams {
    /// Focal length of the rectified cameras, in pixels.
    pub focal_length: f32,
    /// Distance between the optical centres, in output depth units.
    pub baseline: f32,
}

impl StereoParams {
    pub fn new(focal_length: f32, baseline: f32) -> Self {
        Self {
            focal_length,
            baseline,
        }
    }

    /// Compute depth from disparity; `None` for invalid samples.
    pub fn disparity_to_depth(&self, disparity: Disparity) -> Option<f32> {
        disparity
            .valid()
            .map(|_| self.focal_length * self.baseline / disparity.to_pixels())
    }

    /// Inverse of [`disparity_to_depth`](Self::disparity_to_depth).
    pub fn depth_to_disparity(&self, depth: f32) -> Disparity {
        if depth <= 0.0 {
            return Disparity::INVALID;
        }
        Disparity::from_pixels(self.focal_length * self.baseline / depth)
    }

    /// Per-pixel depth for a whole map, row-major like the input.
    pub fn depth_map(&self, disparity: &DisparityMap) -> Vec<Option<f32>> {
        disparity
            .data
            .iter()
            .map(|&d| self.disparity_to_depth(Disparity::from_raw(d)))
            .collect()
    }
}

/// Compute depth map from disparity map
pub fn disparity_to_depth(disparity: &DisparityMap, params: &StereoParams) -> Vec<Option<f32>> {
    params.depth_map(disparity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_params() {
        let params = StereoParams::new(500.0, 0.1);

        // depth = (f * B) / disparity, 50 px encoded as 800
        let d = Disparity::from_raw(800);
        let expected = (500.0 * 0.1) / 50.0;
        assert!((params.disparity_to_depth(d).unwrap() - expected).abs() < 1e-6);
        assert_eq!(params.disparity_to_depth(Disparity::INVALID), None);
        assert_eq!(params.disparity_to_depth(Disparity::from_raw(0)), None);
    }

    #[test]
    fn test_depth_round_trip() {
        let params = StereoParams::new(400.0, 0.12);
        assert_eq!(params.depth_to_disparity(1.2).raw(), 640);
        assert_eq!(params.depth_to_disparity(-1.0), Disparity::INVALID);
    }

    #[test]
    fn test_depth_map() {
        let map = DisparityMap::from_raw(2, 1, vec![-16, 160]).unwrap();
        let depths = disparity_to_depth(&map, &StereoParams::new(100.0, 1.0));
        assert_eq!(depths[0], None);
        assert!((depths[1].unwrap() - 10.0).abs() < 1e-5);
    }
}
