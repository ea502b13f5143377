//! Stereo rectification by lookup table.
//!
//! A [`RemapTable`] stores, for every pixel of the rectified frame, the linear
//! index of the raw-image pixel it is copied from, or [`NO_SOURCE`] where the
//! rectified pixel has no counterpart. The same table serves grayscale and
//! interleaved RGB images; only the copy stride changes.
//!
//! On disk a table is `"RMAP"`, `width: u32`, `height: u32`, then
//! `width * height` `u32` offsets, all little-endian.

use crate::{Error, Result};
use depth_core::{try_alloc, ProcessingPath};
use image::{GrayImage, RgbImage};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// File tag of a serialized remap table.
pub const REMAP_MAGIC: [u8; 4] = *b"RMAP";

/// Offset meaning "no source pixel"; larger than any achievable index.
pub const NO_SOURCE: u32 = u32::MAX;

const HEADER_LEN: usize = 12;

/// Precomputed per-pixel source index for one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapTable {
    width: u32,
    height: u32,
    offsets: Vec<u32>,
}

impl RemapTable {
    /// Build a table from explicit offsets; `offsets.len()` must equal `width * height`.
    pub fn new(width: u32, height: u32, offsets: Vec<u32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if offsets.len() != expected {
            return Err(Error::dimension_mismatch(format!(
                "remap table {width}x{height} needs {expected} offsets, got {}",
                offsets.len()
            )));
        }
        Ok(Self {
            width,
            height,
            offsets,
        })
    }

    /// A table that copies every pixel to itself.
    pub fn identity(width: u32, height: u32) -> Result<Self> {
        let mut offsets = try_alloc(width as usize * height as usize, 0u32)?;
        for (i, o) in offsets.iter_mut().enumerate() {
            *o = i as u32;
        }
        Self::new(width, height, offsets)
    }

    /// Quantize floating-point rectification maps to the nearest source pixel.
    ///
    /// `map_x`/`map_y` give, for each destination pixel, the source coordinate in
    /// an image of `src_width x src_height`. Coordinates that round outside that
    /// image, or are not finite, become [`NO_SOURCE`].
    pub fn from_maps(
        width: u32,
        height: u32,
        map_x: &[f32],
        map_y: &[f32],
        src_width: u32,
        src_height: u32,
    ) -> Result<Self> {
        let n = width as usize * height as usize;
        if map_x.len() != n || map_y.len() != n {
            return Err(Error::dimension_mismatch(format!(
                "rectification maps must hold {n} entries, got {} and {}",
                map_x.len(),
                map_y.len()
            )));
        }

        let mut offsets = try_alloc(n, NO_SOURCE)?;
        offsets
            .par_iter_mut()
            .zip(map_x.par_iter().zip(map_y.par_iter()))
            .for_each(|(o, (&mx, &my))| {
                let sx = mx.round();
                let sy = my.round();
                if sx.is_finite()
                    && sy.is_finite()
                    && sx >= 0.0
                    && sy >= 0.0
                    && sx < src_width as f32
                    && sy < src_height as f32
                {
                    *o = sy as u32 * src_width + sx as u32;
                }
            });

        Self::new(width, height, offsets)
    }

    /// Parse the serialized form. Never returns a partially filled table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() >= 4 && bytes[..4] != REMAP_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&bytes[..4]);
            return Err(Error::BadMagic { found });
        }
        if bytes.len() < HEADER_LEN {
            return Err(Error::SizeMismatch {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let width = read_u32(&bytes[4..8]);
        let height = read_u32(&bytes[8..12]);
        let payload = &bytes[HEADER_LEN..];
        let count = width as usize * height as usize;
        let expected = count.checked_mul(4).ok_or(Error::SizeMismatch {
            expected: usize::MAX,
            actual: payload.len(),
        })?;
        if payload.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: payload.len(),
            });
        }

        let mut offsets = try_alloc(count, 0u32)?;
        for (o, chunk) in offsets.iter_mut().zip(payload.chunks_exact(4)) {
            *o = read_u32(chunk);
        }

        Self::new(width, height, offsets)
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let len = HEADER_LEN + self.offsets.len() * 4;
        bytes
            .try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailed { bytes: len })?;
        bytes.extend_from_slice(&REMAP_MAGIC);
        bytes.extend_from_slice(&self.width.to_le_bytes());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        for o in &self.offsets {
            bytes.extend_from_slice(&o.to_le_bytes());
        }
        Ok(bytes)
    }

    /// Load a table written by [`RemapTable::save`] or the calibration tooling.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        let mut bytes = try_alloc(len, 0u8)?;
        file.read_exact(&mut bytes)?;

        let table = Self::from_bytes(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            width = table.width,
            height = table.height,
            unmapped = table.sentinel_count(),
            "loaded remap table"
        );
        Ok(table)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Number of destination pixels with no source.
    pub fn sentinel_count(&self) -> usize {
        self.offsets.iter().filter(|&&o| o == NO_SOURCE).count()
    }

    /// Rectify `src` into `dst` (`width * height * channels` bytes).
    ///
    /// Offsets equal to [`NO_SOURCE`], or pointing past the end of `src`, produce
    /// black pixels.
    pub fn apply(&self, src: &[u8], dst: &mut [u8], channels: usize) -> Result<()> {
        self.apply_with(src, dst, channels, ProcessingPath::default())
    }

    pub fn apply_with(
        &self,
        src: &[u8],
        dst: &mut [u8],
        channels: usize,
        path: ProcessingPath,
    ) -> Result<()> {
        if channels != 1 && channels != 3 {
            return Err(Error::invalid_parameters(format!(
                "remap supports 1 or 3 channels, got {channels}"
            )));
        }
        depth_core::check_buffer_len("remap destination", dst.len(), self.width, self.height, channels)?;
        if src.len() % channels != 0 {
            return Err(Error::dimension_mismatch(format!(
                "remap source length {} is not a multiple of {channels} channels",
                src.len()
            )));
        }
        if dst.is_empty() {
            return Ok(());
        }

        let src_pixels = src.len() / channels;
        let row_bytes = self.width as usize * channels;
        let row_offsets = self.offsets.par_chunks(self.width as usize);

        match path {
            ProcessingPath::Scalar => dst
                .par_chunks_mut(row_bytes)
                .zip(row_offsets)
                .for_each(|(row, offsets)| remap_row_scalar(src, row, offsets, channels, src_pixels)),
            ProcessingPath::Vectorized => dst
                .par_chunks_mut(row_bytes)
                .zip(row_offsets)
                .for_each(|(row, offsets)| remap_row_runs(src, row, offsets, channels, src_pixels)),
        }
        Ok(())
    }

    pub fn remap_gray(&self, src: &GrayImage) -> Result<GrayImage> {
        let mut out = try_alloc(self.offsets.len(), 0u8)?;
        self.apply(src.as_raw(), &mut out, 1)?;
        GrayImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| Error::dimension_mismatch("remapped gray buffer does not fit image"))
    }

    pub fn remap_rgb(&self, src: &RgbImage) -> Result<RgbImage> {
        let mut out = try_alloc(self.offsets.len() * 3, 0u8)?;
        self.apply(src.as_raw(), &mut out, 3)?;
        RgbImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| Error::dimension_mismatch("remapped rgb buffer does not fit image"))
    }
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn source_of(o: u32, src_pixels: usize) -> Option<usize> {
    let o = o as usize;
    if o < src_pixels {
        Some(o)
    } else {
        None
    }
}

fn remap_row_scalar(src: &[u8], row: &mut [u8], offsets: &[u32], channels: usize, src_pixels: usize) {
    for (px, &o) in row.chunks_exact_mut(channels).zip(offsets.iter()) {
        match source_of(o, src_pixels) {
            Some(s) => px.copy_from_slice(&src[s * channels..(s + 1) * channels]),
            None => px.fill(0),
        }
    }
}

/// Copies maximal runs of consecutive source indices as single slice copies,
/// and clears runs of unmapped pixels with a single fill.
fn remap_row_runs(src: &[u8], row: &mut [u8], offsets: &[u32], channels: usize, src_pixels: usize) {
    let n = offsets.len();
    let mut p = 0;
    while p < n {
        match source_of(offsets[p], src_pixels) {
            None => {
                let mut end = p + 1;
                while end < n && source_of(offsets[end], src_pixels).is_none() {
                    end += 1;
                }
                row[p * channels..end * channels].fill(0);
                p = end;
            }
            Some(start) => {
                let mut end = p + 1;
                while end < n
                    && source_of(offsets[end], src_pixels) == Some(start + (end - p))
                {
                    end += 1;
                }
                let len = (end - p) * channels;
                row[p * channels..end * channels]
                    .copy_from_slice(&src[start * channels..start * channels + len]);
                p = end;
            }
        }
    }
}

/// The left/right table pair produced by stereo calibration.
#[derive(Debug, Clone)]
pub struct StereoRectifier {
    pub left: RemapTable,
    pub right: RemapTable,
}

impl StereoRectifier {
    pub fn new(left: RemapTable, right: RemapTable) -> Result<Self> {
        if left.width != right.width || left.height != right.height {
            return Err(Error::dimension_mismatch(format!(
                "left table is {}x{} but right table is {}x{}",
                left.width, left.height, right.width, right.height
            )));
        }
        Ok(Self { left, right })
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(left: P, right: Q) -> Result<Self> {
        Self::new(RemapTable::load(left)?, RemapTable::load(right)?)
    }

    pub fn width(&self) -> u32 {
        self.left.width
    }

    pub fn height(&self) -> u32 {
        self.left.height
    }

    pub fn rectify_pair(&self, left: &GrayImage, right: &GrayImage) -> Result<(GrayImage, GrayImage)> {
        Ok((self.left.remap_gray(left)?, self.right.remap_gray(right)?))
    }

    pub fn rectify_pair_rgb(&self, left: &RgbImage, right: &RgbImage) -> Result<(RgbImage, RgbImage)> {
        Ok((self.left.remap_rgb(left)?, self.right.remap_rgb(right)?))
    }
}
