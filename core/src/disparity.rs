//! Q4.4 fixed-point disparity and the per-pixel maps derived from it.
//!
//! At the buffer boundary a disparity is a raw `i16` whose real value is
//! `raw / 16`. Anything `> 0` is valid; anything `<= 0` is invalid, and the
//! canonical invalid value is [`INVALID_DISPARITY`] (`-16`, i.e. `-1.0`).
//! Inside the engines the validity is carried explicitly through
//! [`Disparity::valid`] rather than by comparing signs at every call site.

use crate::storage::{try_alloc, try_clone_slice};
use crate::{check_buffer_len, Result};
use image::GrayImage;

/// Raw value written wherever a stage invalidates a pixel.
pub const INVALID_DISPARITY: i16 = -16;

/// Number of fractional steps per pixel in Q4.4.
pub const SUBPIXEL_SCALE: i16 = 16;

/// A single Q4.4 disparity sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Disparity(i16);

impl Disparity {
    pub const INVALID: Disparity = Disparity(INVALID_DISPARITY);

    #[inline]
    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    /// Encode a real-valued disparity, rounding to the nearest 1/16 pixel.
    /// Non-positive or non-finite inputs encode as [`Disparity::INVALID`].
    pub fn from_pixels(pixels: f32) -> Self {
        let scaled = (pixels * SUBPIXEL_SCALE as f32).round();
        if !scaled.is_finite() || scaled < 1.0 {
            return Self::INVALID;
        }
        Self(scaled.min(i16::MAX as f32) as i16)
    }

    #[inline]
    pub const fn raw(self) -> i16 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }

    /// The raw value if the sample is valid.
    #[inline]
    pub const fn valid(self) -> Option<i16> {
        if self.0 > 0 {
            Some(self.0)
        } else {
            None
        }
    }

    #[inline]
    pub fn to_pixels(self) -> f32 {
        self.0 as f32 / SUBPIXEL_SCALE as f32
    }
}

impl From<Option<i16>> for Disparity {
    fn from(value: Option<i16>) -> Self {
        match value {
            Some(raw) if raw > 0 => Self(raw),
            _ => Self::INVALID,
        }
    }
}

/// Row-major map of raw Q4.4 disparities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisparityMap {
    pub data: Vec<i16>,
    pub width: u32,
    pub height: u32,
}

impl DisparityMap {
    /// A map of the given size with every pixel set to [`INVALID_DISPARITY`].
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::filled(width, height, INVALID_DISPARITY)
    }

    pub fn filled(width: u32, height: u32, raw: i16) -> Result<Self> {
        let data = try_alloc(width as usize * height as usize, raw)?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Wrap an existing buffer; fails if its length disagrees with the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<i16>) -> Result<Self> {
        check_buffer_len("disparity map", data.len(), width, height, 1)?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Fallible deep copy.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            data: try_clone_slice(&self.data)?,
            width: self.width,
            height: self.height,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Disparity {
        self.data
            .get(self.index(x, y))
            .copied()
            .map(Disparity::from_raw)
            .unwrap_or(Disparity::INVALID)
    }

    pub fn set(&mut self, x: u32, y: u32, value: Disparity) {
        let idx = self.index(x, y);
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = value.raw();
        }
    }

    pub fn same_shape(&self, other: &DisparityMap) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| d > 0).count()
    }

    pub fn valid_fraction(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.valid_count() as f32 / self.data.len() as f32
    }

    /// Derive the validity mask (1 where the disparity is valid).
    pub fn validity_mask(&self) -> Result<ValidityMask> {
        let mut mask = ValidityMask::new(self.width, self.height)?;
        for (m, &d) in mask.data.iter_mut().zip(self.data.iter()) {
            *m = u8::from(d > 0);
        }
        Ok(mask)
    }

    /// Grayscale visualization normalized over the valid range; invalid pixels are black.
    pub fn to_image(&self) -> GrayImage {
        let (min_val, max_val) = self
            .data
            .iter()
            .filter(|&&d| d > 0)
            .fold((i16::MAX, i16::MIN), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        let range = max_val as i32 - min_val as i32;

        let pixels = self
            .data
            .iter()
            .map(|&d| {
                if d <= 0 {
                    0
                } else if range > 0 {
                    (1 + (d as i32 - min_val as i32) * 254 / range) as u8
                } else {
                    255
                }
            })
            .collect();

        GrayImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

/// Binary per-pixel validity: `1` valid, `0` invalid. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ValidityMask {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            data: try_alloc(width as usize * height as usize, 0u8)?,
            width,
            height,
        })
    }

    #[inline]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .is_some_and(|&m| m != 0)
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m != 0).count()
    }
}

/// Per-pixel quality score, 0 = none, 255 = high. Always 0 where disparity is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfidenceMap {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ConfidenceMap {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            data: try_alloc(width as usize * height as usize, 0u8)?,
            width,
            height,
        })
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&c| c as u64).sum::<u64>() as f32 / self.data.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_follows_sign() {
        assert!(Disparity::from_raw(1).is_valid());
        assert!(!Disparity::from_raw(0).is_valid());
        assert!(!Disparity::from_raw(-3).is_valid());
        assert_eq!(Disparity::from_raw(32).valid(), Some(32));
        assert_eq!(Disparity::INVALID.valid(), None);
    }

    #[test]
    fn pixel_conversion() {
        assert_eq!(Disparity::from_pixels(2.5).raw(), 40);
        assert_eq!(Disparity::from_raw(40).to_pixels(), 2.5);
        assert_eq!(Disparity::from_pixels(0.0), Disparity::INVALID);
        assert_eq!(Disparity::from_pixels(-4.0), Disparity::INVALID);
        assert_eq!(Disparity::from_pixels(f32::NAN), Disparity::INVALID);
    }

    #[test]
    fn option_round_trip_collapses_invalid() {
        assert_eq!(Disparity::from(Some(0)), Disparity::INVALID);
        assert_eq!(Disparity::from(None), Disparity::INVALID);
        assert_eq!(Disparity::from(Some(17)).raw(), 17);
    }

    #[test]
    fn map_starts_invalid() {
        let map = DisparityMap::new(4, 3).unwrap();
        assert_eq!(map.len(), 12);
        assert!(map.data.iter().all(|&d| d == INVALID_DISPARITY));
        assert_eq!(map.valid_count(), 0);
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(DisparityMap::from_raw(2, 2, vec![0; 3]).is_err());
        assert!(DisparityMap::from_raw(2, 2, vec![0; 4]).is_ok());
    }

    #[test]
    fn validity_mask_and_image() {
        let map = DisparityMap::from_raw(3, 1, vec![-16, 16, 48]).unwrap();
        let mask = map.validity_mask().unwrap();
        assert_eq!(mask.data, vec![0, 1, 1]);
        assert_eq!(mask.count(), 2);

        let img = map.to_image();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 1);
        assert_eq!(img.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn get_set_out_of_bounds_is_invalid() {
        let mut map = DisparityMap::new(2, 2).unwrap();
        map.set(1, 1, Disparity::from_raw(20));
        assert_eq!(map.get(1, 1).raw(), 20);
        assert_eq!(map.get(5, 5), Disparity::INVALID);
    }

    #[test]
    fn mask_and_confidence_out_of_bounds_fall_back() {
        let map = DisparityMap::filled(2, 2, 32).unwrap();
        let mask = map.validity_mask().unwrap();
        assert!(mask.is_set(1, 1));
        assert!(!mask.is_set(5, 5));
        assert!(!mask.is_set(0, 7));

        let conf = ConfidenceMap::new(2, 2).unwrap();
        assert_eq!(conf.get(9, 9), 0);
    }
}
