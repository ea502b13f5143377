use depth_core::{try_alloc, Result};
use image::GrayImage;
use rayon::prelude::*;

/// Largest value [`sobel_magnitude`] can produce (|gx| + |gy| on a 0/255 step).
pub const SOBEL_L1_MAX: u16 = 2040;

/// 3x3 Sobel derivatives at `(x, y)` with replicated borders.
#[inline]
fn sobel_at(src: &[u8], width: usize, height: usize, x: usize, y: usize) -> (i32, i32) {
    let xm = x.saturating_sub(1);
    let xp = (x + 1).min(width - 1);
    let ym = y.saturating_sub(1);
    let yp = (y + 1).min(height - 1);

    let p = |px: usize, py: usize| src[py * width + px] as i32;

    let gx = (p(xp, ym) + 2 * p(xp, y) + p(xp, yp)) - (p(xm, ym) + 2 * p(xm, y) + p(xm, yp));
    let gy = (p(xm, yp) + 2 * p(x, yp) + p(xp, yp)) - (p(xm, ym) + 2 * p(x, ym) + p(xp, ym));
    (gx, gy)
}

/// Per-pixel Sobel gradient magnitude `|gx| + |gy|`, in `0..=SOBEL_L1_MAX`.
pub fn sobel_magnitude(src: &GrayImage) -> Result<Vec<u16>> {
    let width = src.width() as usize;
    let height = src.height() as usize;
    let mut out = try_alloc(width * height, 0u16)?;
    if width == 0 || height == 0 {
        return Ok(out);
    }
    let data = src.as_raw();

    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, px) in row.iter_mut().enumerate() {
            let (gx, gy) = sobel_at(data, width, height, x, y);
            *px = (gx.abs() + gy.abs()) as u16;
        }
    });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn sobel_constant_image_is_zero() {
        let img = GrayImage::from_pixel(8, 6, Luma([128]));
        let mag = sobel_magnitude(&img).unwrap();
        assert!(mag.iter().all(|&m| m == 0));
    }

    #[test]
    fn sobel_vertical_edge() {
        let mut img = GrayImage::new(8, 8);
        for y in 0..8 {
            for x in 4..8 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let mag = sobel_magnitude(&img).unwrap();
        assert_eq!(mag[4 * 8 + 4], 1020);
        assert_eq!(mag[4 * 8 + 1], 0);
    }

    #[test]
    fn sobel_checkerboard_bounded() {
        let mut img = GrayImage::new(9, 9);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Luma([if (x + y) % 2 == 0 { 255 } else { 0 }]);
        }
        let mag = sobel_magnitude(&img).unwrap();
        assert!(mag.iter().all(|&m| m <= SOBEL_L1_MAX));
    }
}
