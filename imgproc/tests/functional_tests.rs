use depth_core::ValidityMask;
use depth_imgproc::*;
use image::{GrayImage, Luma};

fn mask_from(width: u32, height: u32, bits: &[u8]) -> ValidityMask {
    let mut m = ValidityMask::new(width, height).unwrap();
    m.data.copy_from_slice(bits);
    m
}

#[test]
fn test_close_fills_pinhole() {
    #[rustfmt::skip]
    let bits = [
        1, 1, 1, 1, 1,
        1, 1, 1, 1, 1,
        1, 1, 0, 1, 1,
        1, 1, 1, 1, 1,
        1, 1, 1, 1, 1,
    ];
    let m = mask_from(5, 5, &bits);
    let closed = morph(&m, MorphType::Close, 1).unwrap();
    assert_eq!(closed.count(), 25);
}

#[test]
fn test_open_removes_speck() {
    let mut bits = [0u8; 49];
    bits[3 * 7 + 3] = 1;
    // 3x3 block in the top-left corner survives.
    for y in 0..3 {
        for x in 0..3 {
            bits[y * 7 + x] = 1;
        }
    }
    let m = mask_from(7, 7, &bits);
    let opened = morph(&m, MorphType::Open, 1).unwrap();
    assert!(!opened.is_set(3, 3));
    assert!(opened.is_set(0, 0) && opened.is_set(2, 2));
    assert_eq!(opened.count(), 9);
}

#[test]
fn test_morph_into_rejects_short_buffer() {
    let src = vec![1u8; 12];
    let mut dst = vec![0u8; 11];
    assert!(dilate_into(&src, &mut dst, 4, 3, 1).is_err());
    assert!(erode_into(&src, &mut dst, 4, 3, 1).is_err());
}

#[test]
fn test_sobel_bounds() {
    let mut img = GrayImage::new(6, 6);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = Luma([if (x + y) % 2 == 0 { 255 } else { 0 }]);
    }
    let mag = sobel_magnitude(&img).unwrap();
    assert_eq!(mag.len(), 36);
    assert!(mag.iter().all(|&m| m <= SOBEL_L1_MAX));
}

#[test]
fn test_heat_colormap_endpoints() {
    assert_eq!(heat_color(0), [0, 0, 255]);
    assert_eq!(heat_color(255), [255, 0, 0]);

    let scores = [0u8, 128, 255, 64];
    let rgb = apply_heat_colormap(&scores, 2, 2).unwrap();
    assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 255]);
    assert_eq!(rgb.get_pixel(0, 1).0, heat_color(255));
    assert!(apply_heat_colormap(&scores, 3, 2).is_err());
}
