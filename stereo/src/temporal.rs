//! Ring-buffer temporal median of disparity frames.
//!
//! Every pushed frame is stored in a fixed ring of `depth` slots. The output at
//! each pixel is the median of that pixel across the frames pushed since the
//! last reset: the middle sample for an odd count, the floored mean of the two
//! middle samples for an even count. All stored samples take part, including
//! invalid ones; the filter is purely numeric over the Q4.4 values. A result
//! that lands at or below zero is written as the invalid sentinel.

use crate::{Error, Result};
use depth_core::{try_alloc, DisparityMap, INVALID_DISPARITY};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// When to discard history because the scene moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneChangeConfig {
    pub enabled: bool,
    /// Raw Q4.4 difference above which a pixel counts as changed.
    pub threshold: i16,
    /// Fraction of compared pixels that must change to trigger a reset.
    pub fraction: f32,
}

impl Default for SceneChangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 48,
            fraction: 0.5,
        }
    }
}

impl SceneChangeConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: i16) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_fraction(mut self, fraction: f32) -> Self {
        self.fraction = fraction;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub enabled: bool,
    /// Ring length, at least 2.
    pub depth: usize,
    pub scene_change: SceneChangeConfig,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            depth: 3,
            scene_change: SceneChangeConfig::default(),
        }
    }
}

/// Temporal median state for one stream of fixed resolution.
#[derive(Debug)]
pub struct TemporalFilter {
    width: u32,
    height: u32,
    depth: usize,
    /// `depth` frames back to back.
    frames: Vec<i16>,
    cursor: usize,
    filled: usize,
    last_output: Vec<i16>,
    scene_change: SceneChangeConfig,
    resets: u64,
}

impl TemporalFilter {
    /// A filter with scene-change detection disabled.
    pub fn new(width: u32, height: u32, depth: usize) -> Result<Self> {
        if depth < 2 {
            return Err(Error::invalid_parameters(format!(
                "temporal depth must be at least 2, got {depth}"
            )));
        }
        let n = width as usize * height as usize;
        let total = n.checked_mul(depth).ok_or_else(|| {
            Error::invalid_parameters(format!("temporal ring of {depth} x {n} pixels overflows"))
        })?;
        Ok(Self {
            width,
            height,
            depth,
            frames: try_alloc(total, 0i16)?,
            cursor: 0,
            filled: 0,
            last_output: try_alloc(n, 0i16)?,
            scene_change: SceneChangeConfig::disabled(),
            resets: 0,
        })
    }

    pub fn from_config(width: u32, height: u32, config: &TemporalConfig) -> Result<Self> {
        Ok(Self::new(width, height, config.depth)?.with_scene_change(config.scene_change))
    }

    pub fn with_scene_change(mut self, config: SceneChangeConfig) -> Self {
        self.scene_change = config;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Frames pushed since the last reset, saturating at `depth`.
    pub fn fill_count(&self) -> usize {
        self.filled
    }

    /// Number of resets so far, explicit or scene-change triggered.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    /// Forget all buffered frames; the next push starts from an empty window.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.filled = 0;
        self.resets += 1;
        tracing::debug!(depth = self.depth, "temporal filter reset");
    }

    fn check_shape(&self, what: &str, map: &DisparityMap) -> Result<()> {
        if map.width != self.width || map.height != self.height {
            return Err(Error::dimension_mismatch(format!(
                "{what} is {}x{}, temporal filter is {}x{}",
                map.width, map.height, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Whether `frame` differs from the current temporal output enough to
    /// count as a scene change.
    ///
    /// Only pixels valid in both frames are compared. Returns `false` while the
    /// window is empty or when no pixel can be compared.
    pub fn detect_scene_change(&self, frame: &DisparityMap) -> bool {
        if self.filled == 0 || frame.len() != self.last_output.len() {
            return false;
        }
        let threshold = self.scene_change.threshold as i32;
        let (compared, changed) = frame
            .data
            .par_iter()
            .zip(self.last_output.par_iter())
            .filter(|&(&a, &b)| a > 0 && b > 0)
            .map(|(&a, &b)| (1usize, usize::from((a as i32 - b as i32).abs() > threshold)))
            .reduce(|| (0, 0), |x, y| (x.0 + y.0, x.1 + y.1));

        compared > 0 && changed as f32 > self.scene_change.fraction * compared as f32
    }

    fn ingest(&mut self, frame: &DisparityMap) {
        if self.scene_change.enabled && self.detect_scene_change(frame) {
            tracing::debug!(
                threshold = self.scene_change.threshold,
                fraction = self.scene_change.fraction,
                "scene change detected"
            );
            self.reset();
        }

        let n = self.last_output.len();
        self.frames[self.cursor * n..(self.cursor + 1) * n].copy_from_slice(&frame.data);
        self.cursor = (self.cursor + 1) % self.depth;
        self.filled = (self.filled + 1).min(self.depth);
    }

    fn update_output(&mut self) {
        let n = self.last_output.len();
        if n == 0 {
            return;
        }
        let width = self.width as usize;
        let filled = self.filled;
        let frames = &self.frames;

        self.last_output
            .par_chunks_mut(width)
            .enumerate()
            .for_each_init(
                || Vec::with_capacity(filled),
                |samples, (y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        let i = y * width + x;
                        samples.clear();
                        samples.extend((0..filled).map(|slot| frames[slot * n + i]));
                        let v = temporal_median(samples);
                        *out = if v > 0 { v } else { INVALID_DISPARITY };
                    }
                },
            );
    }

    /// Store `input` and write the temporal median into `output`.
    pub fn push(&mut self, input: &DisparityMap, output: &mut DisparityMap) -> Result<()> {
        self.check_shape("input frame", input)?;
        self.check_shape("output frame", output)?;
        self.ingest(input);
        self.update_output();
        output.data.copy_from_slice(&self.last_output);
        Ok(())
    }

    /// Store `frame` and replace its contents with the temporal median.
    pub fn push_in_place(&mut self, frame: &mut DisparityMap) -> Result<()> {
        self.check_shape("frame", frame)?;
        self.ingest(frame);
        self.update_output();
        frame.data.copy_from_slice(&self.last_output);
        Ok(())
    }
}

/// Median of `samples`; the floored mean of the two middle values for even counts.
fn temporal_median(samples: &mut [i16]) -> i16 {
    samples.sort_unstable();
    let len = samples.len();
    if len == 0 {
        return 0;
    }
    if len % 2 == 1 {
        samples[len / 2]
    } else {
        let a = samples[len / 2 - 1] as i32;
        let b = samples[len / 2] as i32;
        ((a + b) >> 1) as i16
    }
}
