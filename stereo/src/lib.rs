//! Stereo rectification and disparity post-processing
//!
//! This crate holds the numeric engines between the raw sensor frames and the
//! final depth output: lookup-table rectification, specular masking, spatial
//! median, morphological cleanup, temporal median and confidence estimation.
//! Stereo matching itself happens behind the [`StereoMatcher`] trait.

use image::GrayImage;

pub mod cleanup;
pub mod confidence;
pub mod depth;
pub mod median;
pub mod pipeline;
pub mod rectification;
pub mod specular;
pub mod temporal;

pub use cleanup::*;
pub use confidence::*;
pub use depth::*;
pub use median::*;
pub use pipeline::*;
pub use rectification::*;
pub use specular::*;
pub use temporal::*;

pub use depth_core::{
    ConfidenceMap, Disparity, DisparityMap, Error, ProcessingPath, Result, ValidityMask,
    INVALID_DISPARITY,
};

/// Stereo matching algorithm trait
///
/// Implementations consume two equal-size rectified grayscale images and
/// produce a Q4.4 disparity map of the same size.
pub trait StereoMatcher {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap>;
}

impl<F> StereoMatcher for F
where
    F: Fn(&GrayImage, &GrayImage) -> Result<DisparityMap>,
{
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
        self(left, right)
    }
}

/// Run `matcher`, enforcing the shape contract on both sides of the call.
pub fn match_checked<M: StereoMatcher + ?Sized>(
    matcher: &M,
    left: &GrayImage,
    right: &GrayImage,
) -> Result<DisparityMap> {
    if left.dimensions() != right.dimensions() {
        return Err(Error::dimension_mismatch(format!(
            "left image is {}x{}, right image is {}x{}",
            left.width(),
            left.height(),
            right.width(),
            right.height()
        )));
    }

    let disparity = matcher.compute(left, right)?;
    let expected = left.width() as usize * left.height() as usize;
    if (disparity.width, disparity.height) != left.dimensions() || disparity.data.len() != expected {
        return Err(Error::dimension_mismatch(format!(
            "matcher returned {}x{} ({} values) for {}x{} input",
            disparity.width,
            disparity.height,
            disparity.data.len(),
            left.width(),
            left.height()
        )));
    }
    Ok(disparity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_matcher_passes_through() {
        let matcher = |l: &GrayImage, _: &GrayImage| DisparityMap::filled(l.width(), l.height(), 32);
        let img = GrayImage::new(4, 3);
        let disp = match_checked(&matcher, &img, &img).unwrap();
        assert_eq!(disp.valid_count(), 12);
    }

    #[test]
    fn mismatched_inputs_rejected() {
        let matcher = |l: &GrayImage, _: &GrayImage| DisparityMap::new(l.width(), l.height());
        assert!(match_checked(&matcher, &GrayImage::new(4, 3), &GrayImage::new(4, 4)).is_err());
    }

    #[test]
    fn wrong_output_shape_is_hard_error() {
        let matcher = |_: &GrayImage, _: &GrayImage| DisparityMap::new(2, 2);
        let img = GrayImage::new(4, 3);
        assert!(matches!(
            match_checked(&matcher, &img, &img),
            Err(Error::DimensionMismatch(_))
        ));
    }
}
