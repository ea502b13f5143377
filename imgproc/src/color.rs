use depth_core::{check_buffer_len, try_alloc, Result};
use image::RgbImage;
use std::sync::OnceLock;

static HEAT_LUT: OnceLock<[[u8; 3]; 256]> = OnceLock::new();

/// Blue -> cyan -> green -> yellow -> red, in four linear segments of 64 steps.
const fn heat_entry(v: u8) -> [u8; 3] {
    let v = v as u16;
    let segment = v / 64;
    let t = ((v % 64) * 255 / 63) as u8;
    match segment {
        0 => [0, t, 255],
        1 => [0, 255, 255 - t],
        2 => [t, 255, 0],
        _ => [255, 255 - t, 0],
    }
}

fn heat_lut() -> &'static [[u8; 3]; 256] {
    HEAT_LUT.get_or_init(|| {
        let mut lut = [[0u8; 3]; 256];
        for (v, entry) in lut.iter_mut().enumerate() {
            *entry = heat_entry(v as u8);
        }
        lut
    })
}

/// RGB color of a single score on the heat gradient.
#[inline]
pub fn heat_color(v: u8) -> [u8; 3] {
    heat_lut()[v as usize]
}

/// Map every score through the heat gradient into an interleaved RGB image.
pub fn apply_heat_colormap(scores: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    check_buffer_len("heat colormap input", scores.len(), width, height, 1)?;
    let lut = heat_lut();
    let mut rgb = try_alloc(scores.len() * 3, 0u8)?;
    for (dst, &s) in rgb.chunks_exact_mut(3).zip(scores.iter()) {
        dst.copy_from_slice(&lut[s as usize]);
    }
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        depth_core::Error::dimension_mismatch("heat colormap output does not fit image")
    })
}
