use depth_core::*;

#[test]
fn test_disparity_fixed_point() {
    let d = Disparity::from_pixels(12.5);
    assert_eq!(d.raw(), 200);
    assert!((d.to_pixels() - 12.5).abs() < 1e-6);
    assert_eq!(d.valid(), Some(200));

    assert_eq!(Disparity::from_pixels(0.5).raw(), 8);
    // Rounds to zero sixteenths.
    assert_eq!(Disparity::from_pixels(0.02), Disparity::INVALID);
    assert_eq!(Disparity::from_pixels(f32::NAN), Disparity::INVALID);
    assert!(!Disparity::from_raw(0).is_valid());
    assert!(!Disparity::from_raw(-3).is_valid());
}

#[test]
fn test_disparity_map_construction() {
    let map = DisparityMap::new(5, 4).unwrap();
    assert_eq!(map.len(), 20);
    assert!(map.data.iter().all(|&d| d == INVALID_DISPARITY));
    assert_eq!(map.valid_count(), 0);

    assert!(matches!(
        DisparityMap::from_raw(5, 4, vec![0; 19]),
        Err(Error::DimensionMismatch(_))
    ));
}

#[test]
fn test_validity_mask_matches_values() {
    let data = vec![-16, 0, 1, 16, -2, 400];
    let map = DisparityMap::from_raw(3, 2, data).unwrap();
    let mask = map.validity_mask().unwrap();
    assert_eq!(mask.data, vec![0, 0, 1, 1, 0, 1]);
    assert_eq!(mask.count(), map.valid_count());
    assert!((map.valid_fraction() - 0.5).abs() < 1e-6);
}

#[test]
fn test_to_image_invalid_is_black() {
    let map = DisparityMap::from_raw(4, 1, vec![-16, 16, 32, 48]).unwrap();
    let img = map.to_image();
    assert_eq!(img.get_pixel(0, 0)[0], 0);
    assert_eq!(img.get_pixel(1, 0)[0], 1);
    assert_eq!(img.get_pixel(3, 0)[0], 255);
}

#[test]
fn test_set_and_get_out_of_bounds() {
    let mut map = DisparityMap::filled(3, 3, 64).unwrap();
    map.set(1, 1, Disparity::INVALID);
    assert_eq!(map.get(1, 1), Disparity::INVALID);
    // Past the end reads back as invalid and writes are dropped.
    map.set(0, 3, Disparity::from_raw(99));
    assert_eq!(map.get(0, 3), Disparity::INVALID);
    assert_eq!(map.valid_count(), 8);
}

#[test]
fn test_allocation_failure_is_error() {
    let err = try_alloc::<u64>(usize::MAX / 2, 0).unwrap_err();
    assert!(err.is_allocation_failure());
}

#[test]
fn test_processing_path_serde() {
    let path: ProcessingPath = serde_json::from_str("\"scalar\"").unwrap();
    assert_eq!(path, ProcessingPath::Scalar);
    assert_eq!(ProcessingPath::default(), ProcessingPath::Vectorized);
}
