//! Binary morphology on validity masks.
//!
//! The structuring element is a square of side `2 * radius + 1` clamped at the
//! image border: pixels outside the image are ignored, never treated as set or
//! unset. Because a square element is separable, each operation runs as a
//! horizontal pass followed by a vertical pass over sliding-window counts.

use depth_core::{check_buffer_len, try_alloc, Result, ValidityMask};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphType {
    Erode,
    Dilate,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Any,
    All,
}

impl Rule {
    #[inline]
    fn apply(self, count: u32, window: u32) -> u8 {
        match self {
            Rule::Any => u8::from(count > 0),
            Rule::All => u8::from(count == window),
        }
    }
}

/// Clamped window `[lo, hi]` of `radius` around `i` on a line of `len` samples.
#[inline]
fn window(i: usize, radius: usize, len: usize) -> (usize, usize) {
    (i.saturating_sub(radius), (i + radius).min(len - 1))
}

fn pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, radius: usize, rule: Rule) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }

    // Vertical prefix counts, one extra leading row of zeros.
    let mut col_prefix = try_alloc((height + 1) * width, 0u32)?;
    let mut tmp = try_alloc(width * height, 0u8)?;

    // Horizontal pass: src -> tmp.
    tmp.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each_init(
            || vec![0u32; width + 1],
            |prefix, (out_row, in_row)| {
                for (x, &v) in in_row.iter().enumerate() {
                    prefix[x + 1] = prefix[x] + u32::from(v != 0);
                }
                for (x, out) in out_row.iter_mut().enumerate() {
                    let (lo, hi) = window(x, radius, width);
                    let count = prefix[hi + 1] - prefix[lo];
                    *out = rule.apply(count, (hi - lo + 1) as u32);
                }
            },
        );

    for y in 0..height {
        let (done, rest) = col_prefix.split_at_mut((y + 1) * width);
        let prev = &done[y * width..];
        let cur = &mut rest[..width];
        let row = &tmp[y * width..(y + 1) * width];
        for x in 0..width {
            cur[x] = prev[x] + u32::from(row[x] != 0);
        }
    }

    // Vertical pass: tmp -> dst.
    dst.par_chunks_mut(width).enumerate().for_each(|(y, out_row)| {
        let (lo, hi) = window(y, radius, height);
        let top = &col_prefix[lo * width..(lo + 1) * width];
        let bottom = &col_prefix[(hi + 1) * width..(hi + 2) * width];
        let span = (hi - lo + 1) as u32;
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = rule.apply(bottom[x] - top[x], span);
        }
    });

    Ok(())
}

/// Dilate a raw mask buffer (nonzero = set) into `dst` as 0/1.
pub fn dilate_into(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: u32) -> Result<()> {
    check_buffer_len("dilate src", src.len(), width, height, 1)?;
    check_buffer_len("dilate dst", dst.len(), width, height, 1)?;
    pass(src, dst, width as usize, height as usize, radius as usize, Rule::Any)
}

/// Erode a raw mask buffer (nonzero = set) into `dst` as 0/1.
pub fn erode_into(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: u32) -> Result<()> {
    check_buffer_len("erode src", src.len(), width, height, 1)?;
    check_buffer_len("erode dst", dst.len(), width, height, 1)?;
    pass(src, dst, width as usize, height as usize, radius as usize, Rule::All)
}

pub fn dilate(src: &ValidityMask, radius: u32) -> Result<ValidityMask> {
    let mut out = ValidityMask::new(src.width, src.height)?;
    dilate_into(&src.data, &mut out.data, src.width, src.height, radius)?;
    Ok(out)
}

pub fn erode(src: &ValidityMask, radius: u32) -> Result<ValidityMask> {
    let mut out = ValidityMask::new(src.width, src.height)?;
    erode_into(&src.data, &mut out.data, src.width, src.height, radius)?;
    Ok(out)
}

pub fn morph(src: &ValidityMask, morph_type: MorphType, radius: u32) -> Result<ValidityMask> {
    match morph_type {
        MorphType::Erode => erode(src, radius),
        MorphType::Dilate => dilate(src, radius),
        MorphType::Open => {
            let eroded = erode(src, radius)?;
            dilate(&eroded, radius)
        }
        MorphType::Close => {
            let dilated = dilate(src, radius)?;
            erode(&dilated, radius)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(width: u32, height: u32, set: &[(u32, u32)]) -> ValidityMask {
        let mut m = ValidityMask::new(width, height).unwrap();
        for &(x, y) in set {
            m.data[(y * width + x) as usize] = 1;
        }
        m
    }

    /// Direct O(r^2) reference with the same clamp rule.
    fn naive(src: &ValidityMask, radius: i32, all: bool) -> Vec<u8> {
        let (w, h) = (src.width as i32, src.height as i32);
        let mut out = vec![0u8; src.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut any = false;
                let mut every = true;
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let (px, py) = (x + dx, y + dy);
                        if px < 0 || py < 0 || px >= w || py >= h {
                            continue;
                        }
                        let set = src.data[(py * w + px) as usize] != 0;
                        any |= set;
                        every &= set;
                    }
                }
                out[(y * w + x) as usize] = u8::from(if all { every } else { any });
            }
        }
        out
    }

    #[test]
    fn dilate_single_pixel_makes_square() {
        let m = mask(7, 7, &[(3, 3)]);
        let d = dilate(&m, 1).unwrap();
        assert_eq!(d.count(), 9);
        assert!(d.is_set(2, 2) && d.is_set(4, 4));
        assert!(!d.is_set(1, 3));
    }

    #[test]
    fn dilate_clamps_at_corner() {
        let m = mask(5, 5, &[(0, 0)]);
        let d = dilate(&m, 2).unwrap();
        assert_eq!(d.count(), 9);
    }

    #[test]
    fn erode_keeps_full_image() {
        let mut m = ValidityMask::new(4, 3).unwrap();
        m.data.fill(1);
        let e = erode(&m, 3).unwrap();
        assert_eq!(e.count(), 12);
    }

    #[test]
    fn radius_zero_is_identity() {
        let m = mask(6, 4, &[(1, 1), (5, 3), (2, 0)]);
        assert_eq!(dilate(&m, 0).unwrap(), m);
        assert_eq!(erode(&m, 0).unwrap(), m);
    }

    #[test]
    fn separable_matches_naive() {
        let mut m = ValidityMask::new(13, 9).unwrap();
        for (i, v) in m.data.iter_mut().enumerate() {
            *v = u8::from((i * 7 + i / 5) % 3 != 0);
        }
        for r in 0..4 {
            assert_eq!(dilate(&m, r).unwrap().data, naive(&m, r as i32, false));
            assert_eq!(erode(&m, r).unwrap().data, naive(&m, r as i32, true));
        }
    }

    #[test]
    fn close_fills_hole_open_removes_speck() {
        let mut m = ValidityMask::new(5, 5).unwrap();
        m.data.fill(1);
        m.data[12] = 0;
        let closed = morph(&m, MorphType::Close, 1).unwrap();
        assert_eq!(closed.count(), 25);

        let speck = mask(5, 5, &[(2, 2)]);
        let opened = morph(&speck, MorphType::Open, 1).unwrap();
        assert_eq!(opened.count(), 0);
    }

    #[test]
    fn rejects_wrong_length() {
        let src = vec![0u8; 5];
        let mut dst = vec![0u8; 6];
        assert!(dilate_into(&src, &mut dst, 3, 2, 1).is_err());
    }
}
