//! End-to-end disparity post-processing.
//!
//! Stage order: specular masking, spatial median, morphological cleanup,
//! temporal median, then confidence from the final disparity.

use crate::confidence::{compute_confidence, ConfidenceConfig};
use crate::median::{median_filter, MedianConfig};
use crate::cleanup::{morph_cleanup, MorphConfig};
use crate::rectification::StereoRectifier;
use crate::specular::{mask_specular_with, SpecularConfig};
use crate::temporal::{TemporalConfig, TemporalFilter};
use crate::{match_checked, Error, Result, StereoMatcher};
use depth_core::{ConfidenceMap, DisparityMap, ProcessingPath};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    pub path: ProcessingPath,
    pub specular: SpecularConfig,
    pub median: MedianConfig,
    pub morph: MorphConfig,
    pub temporal: TemporalConfig,
    pub confidence: ConfidenceConfig,
}

impl PostProcessConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::invalid_parameters(format!("post-process config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::invalid_parameters(format!("post-process config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.median.enabled && (self.median.kernel_size == 0 || self.median.kernel_size % 2 == 0) {
            return Err(Error::invalid_parameters(format!(
                "median kernel size must be odd and non-zero, got {}",
                self.median.kernel_size
            )));
        }
        if self.temporal.enabled && self.temporal.depth < 2 {
            return Err(Error::invalid_parameters(format!(
                "temporal depth must be at least 2, got {}",
                self.temporal.depth
            )));
        }
        if !(0.0..=1.0).contains(&self.temporal.scene_change.fraction) {
            return Err(Error::invalid_parameters(format!(
                "scene change fraction must be within [0, 1], got {}",
                self.temporal.scene_change.fraction
            )));
        }
        self.confidence.validate()
    }
}

/// Everything the post-processor produced for one frame.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub disparity: DisparityMap,
    pub confidence: ConfidenceMap,
    pub left_rectified: GrayImage,
    pub right_rectified: GrayImage,
}

/// Post-processing state for one depth stream.
#[derive(Debug)]
pub struct DepthPostProcessor {
    config: PostProcessConfig,
    width: u32,
    height: u32,
    temporal: Option<TemporalFilter>,
    scratch: DisparityMap,
}

impl DepthPostProcessor {
    pub fn new(width: u32, height: u32, config: PostProcessConfig) -> Result<Self> {
        config.validate()?;
        let temporal = if config.temporal.enabled {
            Some(TemporalFilter::from_config(width, height, &config.temporal)?)
        } else {
            None
        };
        Ok(Self {
            config,
            width,
            height,
            temporal,
            scratch: DisparityMap::new(width, height)?,
        })
    }

    pub fn config(&self) -> &PostProcessConfig {
        &self.config
    }

    pub fn temporal(&self) -> Option<&TemporalFilter> {
        self.temporal.as_ref()
    }

    /// Drop temporal history, e.g. after the caller knows the camera jumped.
    pub fn reset(&mut self) {
        if let Some(temporal) = self.temporal.as_mut() {
            temporal.reset();
        }
    }

    /// Clean `disparity` in place and return its confidence map.
    pub fn process(
        &mut self,
        disparity: &mut DisparityMap,
        left_rect: &GrayImage,
        right_rect: &GrayImage,
    ) -> Result<ConfidenceMap> {
        if disparity.width != self.width || disparity.height != self.height {
            return Err(Error::dimension_mismatch(format!(
                "disparity is {}x{}, post-processor is {}x{}",
                disparity.width, disparity.height, self.width, self.height
            )));
        }
        for (name, img) in [("left", left_rect), ("right", right_rect)] {
            if img.dimensions() != (self.width, self.height) {
                return Err(Error::dimension_mismatch(format!(
                    "{name} image is {}x{}, post-processor is {}x{}",
                    img.width(),
                    img.height(),
                    self.width,
                    self.height
                )));
            }
        }
        let cfg = self.config;
        let raw_valid = disparity.valid_count();

        if cfg.specular.enabled {
            mask_specular_with(
                disparity,
                left_rect,
                right_rect,
                cfg.specular.threshold,
                cfg.specular.radius,
                cfg.path,
            )?;
        }

        if cfg.median.enabled {
            median_filter(disparity, &mut self.scratch, cfg.median.kernel_size)?;
            std::mem::swap(disparity, &mut self.scratch);
        }

        if cfg.morph.enabled {
            morph_cleanup(disparity, cfg.morph.close_radius, cfg.morph.open_radius)?;
        }

        if let Some(temporal) = self.temporal.as_mut() {
            temporal.push_in_place(disparity)?;
        }

        let confidence = compute_confidence(disparity, left_rect, &cfg.confidence)?;

        tracing::debug!(
            raw_valid,
            final_valid = disparity.valid_count(),
            mean_confidence = confidence.mean(),
            "post-processed disparity"
        );
        Ok(confidence)
    }

    /// Rectify a raw pair, run the external matcher, and post-process its output.
    pub fn process_frame<M: StereoMatcher + ?Sized>(
        &mut self,
        matcher: &M,
        rectifier: &StereoRectifier,
        raw_left: &GrayImage,
        raw_right: &GrayImage,
    ) -> Result<ProcessedFrame> {
        let (left_rectified, right_rectified) = rectifier.rectify_pair(raw_left, raw_right)?;
        let mut disparity = match_checked(matcher, &left_rectified, &right_rectified)?;
        let confidence = self.process(&mut disparity, &left_rectified, &right_rectified)?;
        Ok(ProcessedFrame {
            disparity,
            confidence,
            left_rectified,
            right_rectified,
        })
    }
}
