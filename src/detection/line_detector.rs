// src/detection/line_detector.rs
//
// Bright lane marking on a dark surface: histogram-peak lane position,
// crosswalk coverage and dashed/solid classification.

use super::smoother::LinePositionSmoother;
use super::types::{CrosswalkObservation, LaneType, LineReading};
use crate::debug::{annotate_crosswalk, annotate_line};
use crate::preprocessing::{
    bitwise_or, blur_and_threshold, column_histogram, count_foreground, crop_bottom, dilate,
    ensure_bgr, open, open_close, peak, rect_kernel, row_profile, to_gray,
};
use crate::types::{Config, CrosswalkConfig, LaneConfig};
use anyhow::Result;
use opencv::{core::Mat, prelude::*};
use std::time::Instant;
use tracing::{debug, warn};

// Transitions across the half-height level needed to call a marking dashed
const DASHED_MIN_TRANSITIONS: u32 = 2;
// Transitions at which dashed confidence saturates
const DASHED_FULL_CONFIDENCE_TRANSITIONS: f32 = 4.0;
const CROSSWALK_DENOISE_KERNEL: i32 = 3;

pub struct LineDetector {
    lane: LaneConfig,
    crosswalk: CrosswalkConfig,
    frame_center: i32,
    lane_width_px: i32,
    smoother: LinePositionSmoother,
}

impl LineDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            lane: config.lane.clone(),
            crosswalk: config.crosswalk.clone(),
            frame_center: config.camera.frame_center(),
            lane_width_px: config.track.lane_width_px(config.camera.width),
            smoother: LinePositionSmoother::new(
                config.lane.max_change,
                config.lane.max_lost_frames,
            ),
        }
    }

    /// Signed lane offset from the frame center, in pixels.
    pub fn detect_line(&mut self, frame: &Mat, now: Instant) -> Result<LineReading> {
        let mask = self.lane_mask(frame)?;
        let offset = self.estimate_offset(&mask, now)?;

        let debug_frame = annotate_line(&mask, self.frame_center, offset, self.lane_width_px)
            .unwrap_or_else(|e| {
                warn!("Line annotation failed: {}", e);
                Mat::default()
            });

        Ok(LineReading {
            offset,
            debug_frame,
        })
    }

    /// Binary mask of bright markings in the bottom ROI strip.
    pub fn lane_mask(&self, frame: &Mat) -> Result<Mat> {
        ensure_bgr(frame)?;
        let gray = to_gray(frame)?;
        let roi = crop_bottom(&gray, self.lane.roi_height)?;
        let binary = blur_and_threshold(&roi, self.lane.blur_kernel, self.lane.binary_threshold)?;
        open_close(&binary, self.lane.morph_kernel)
    }

    /// Histogram peak over the half of the ROI nearest the vehicle. The peak
    /// is a sum of mask values, so `min_pixels` is compared against 255 per
    /// lit pixel.
    fn lane_column(&self, mask: &Mat) -> Result<Option<i32>> {
        let histogram = column_histogram(mask, mask.rows() / 2)?;
        Ok(match peak(&histogram) {
            Some((column, sum)) if sum >= self.lane.min_pixels => Some(column as i32),
            _ => None,
        })
    }

    fn estimate_offset(&mut self, mask: &Mat, now: Instant) -> Result<Option<i32>> {
        match self.lane_column(mask)? {
            Some(column) => {
                let measured = column - self.frame_center;
                let previous = self.smoother.last_position();
                let offset = self.smoother.record_detection(measured, now);
                if offset != measured {
                    debug!(
                        "Line jump limited: measured {:+} px, previous {:?}, using {:+} px",
                        measured, previous, offset
                    );
                }
                Ok(Some(offset))
            }
            None => {
                let held = self.smoother.record_lost();
                let since = self
                    .smoother
                    .last_detection_time()
                    .map(|t| now.saturating_duration_since(t).as_millis());
                debug!(
                    "Line not visible ({} lost frame(s), last seen {:?} ms ago), holding {:?}",
                    self.smoother.lost_frame_count(),
                    since,
                    held
                );
                Ok(held)
            }
        }
    }

    /// Crosswalk stripes: coverage of the bottom ROI after stroke dilation.
    pub fn is_crosswalk(&self, frame: &Mat) -> Result<CrosswalkObservation> {
        ensure_bgr(frame)?;
        let gray = to_gray(frame)?;
        let roi = crop_bottom(&gray, self.crosswalk.roi_height)?;
        let binary = blur_and_threshold(&roi, self.lane.blur_kernel, self.lane.binary_threshold)?;

        let wide = rect_kernel(self.crosswalk.horizontal_kernel_width, 1)?;
        let tall = rect_kernel(1, self.crosswalk.vertical_kernel_height)?;
        let horizontal = dilate(&binary, &wide)?;
        let vertical = dilate(&binary, &tall)?;
        let combined = bitwise_or(&horizontal, &vertical)?;

        let denoise = rect_kernel(CROSSWALK_DENOISE_KERNEL, CROSSWALK_DENOISE_KERNEL)?;
        let filtered = open(&combined, &denoise)?;

        let total = filtered.rows() as f32 * filtered.cols() as f32;
        let confidence = if total > 0.0 {
            count_foreground(&filtered)? as f32 / total
        } else {
            0.0
        };
        let present = confidence > self.crosswalk.threshold;

        let debug_frame =
            annotate_crosswalk(&filtered, present, confidence).unwrap_or_else(|e| {
                warn!("Crosswalk annotation failed: {}", e);
                Mat::default()
            });

        Ok(CrosswalkObservation {
            present,
            confidence,
            debug_frame,
        })
    }

    /// Dashed vs solid marking from the vertical occupancy of the lane strip.
    ///
    /// Locates the lane in `mask` itself; the offset smoother is untouched.
    pub fn detect_lane_type(&self, mask: &Mat) -> Result<(LaneType, f32)> {
        let Some(line_x) = self.lane_column(mask)? else {
            return Ok((LaneType::Unknown, 0.0));
        };

        let half_width = self.lane_width_px / 2;
        let profile = row_profile(mask, line_x - half_width, line_x + half_width)?;
        let max = profile.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return Ok((LaneType::Unknown, 0.0));
        }

        let occupied: Vec<bool> = profile
            .iter()
            .map(|&count| count as f32 / max as f32 > 0.5)
            .collect();
        let transitions = occupied.windows(2).filter(|w| w[0] != w[1]).count() as u32;

        let kind = if transitions >= DASHED_MIN_TRANSITIONS {
            LaneType::Dashed
        } else {
            LaneType::Solid
        };
        let confidence = (transitions as f32 / DASHED_FULL_CONFIDENCE_TRANSITIONS).min(1.0);
        Ok((kind, confidence))
    }
}
