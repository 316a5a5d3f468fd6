use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat, Rect},
    imgcodecs, imgproc,
    prelude::*,
};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

const RED: (f64, f64, f64) = (0.0, 0.0, 255.0);
const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
const YELLOW: (f64, f64, f64) = (0.0, 255.0, 255.0);

fn color(bgr: (f64, f64, f64)) -> core::Scalar {
    core::Scalar::new(bgr.0, bgr.1, bgr.2, 0.0)
}

fn mask_to_bgr(mask: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::cvt_color_def(mask, &mut out, imgproc::COLOR_GRAY2BGR)?;
    Ok(out)
}

fn vertical_line(img: &mut Mat, x: i32, height: i32, bgr: (f64, f64, f64)) -> Result<()> {
    imgproc::line(
        img,
        core::Point::new(x, 0),
        core::Point::new(x, height),
        color(bgr),
        2,
        imgproc::LINE_8,
        0,
    )?;
    Ok(())
}

fn label(img: &mut Mat, text: &str, bgr: (f64, f64, f64)) -> Result<()> {
    imgproc::put_text(
        img,
        text,
        core::Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        color(bgr),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// Lane mask with the frame center (red), the estimate (green) and the
/// expected lane width around it (yellow).
pub fn annotate_line(
    mask: &Mat,
    frame_center: i32,
    offset: Option<i32>,
    lane_width_px: i32,
) -> Result<Mat> {
    let mut debug_frame = mask_to_bgr(mask)?;
    let roi_height = mask.rows();

    vertical_line(&mut debug_frame, frame_center, roi_height, RED)?;

    if let Some(offset) = offset {
        let x = frame_center + offset;
        vertical_line(&mut debug_frame, x, roi_height, GREEN)?;

        let half_width = lane_width_px / 2;
        imgproc::rectangle(
            &mut debug_frame,
            Rect::new(x - half_width, roi_height / 2, 2 * half_width, 20),
            color(YELLOW),
            2,
            imgproc::LINE_8,
            0,
        )?;
    }

    Ok(debug_frame)
}

pub fn annotate_crosswalk(mask: &Mat, present: bool, confidence: f32) -> Result<Mat> {
    let mut debug_frame = mask_to_bgr(mask)?;
    if present {
        label(
            &mut debug_frame,
            &format!("Crosswalk: {:.2}", confidence),
            GREEN,
        )?;
    }
    Ok(debug_frame)
}

/// Obstacle ROI with zone dividers, every surviving blob boxed in green.
pub fn annotate_obstacles(roi: &Mat, boxes: &[Rect], zone_label: Option<&str>) -> Result<Mat> {
    let mut debug_frame = roi.try_clone()?;
    let width = roi.cols();
    let height = roi.rows();

    vertical_line(&mut debug_frame, width / 3, height, RED)?;
    vertical_line(&mut debug_frame, 2 * width / 3, height, RED)?;

    for rect in boxes {
        imgproc::rectangle(
            &mut debug_frame,
            *rect,
            color(GREEN),
            2,
            imgproc::LINE_8,
            0,
        )?;
    }

    if let Some(zone) = zone_label {
        label(&mut debug_frame, &format!("Obstacle: {}", zone), RED)?;
    }

    Ok(debug_frame)
}

// ============================================================================
// DEBUG SINK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCategory {
    Line,
    Crosswalk,
    Obstacle,
}

impl DebugCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugCategory::Line => "line",
            DebugCategory::Crosswalk => "crosswalk",
            DebugCategory::Obstacle => "obstacle",
        }
    }

    /// Keep one frame out of this many cycles.
    pub fn sample_every(&self) -> u64 {
        match self {
            DebugCategory::Line => 30,
            DebugCategory::Crosswalk => 1,
            DebugCategory::Obstacle => 10,
        }
    }

    pub fn wants(&self, cycle: u64) -> bool {
        cycle % self.sample_every() == 0
    }
}

/// Write-only destination for annotated frames.
pub trait DebugSink {
    fn record(&mut self, cycle: u64, category: DebugCategory, frame: &Mat);

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct NullDebugSink;

impl DebugSink for NullDebugSink {
    fn record(&mut self, _cycle: u64, _category: DebugCategory, _frame: &Mat) {}
}

/// Stores sampled frames as `<dir>/<category>_<cycle>.jpg`.
pub struct DebugImageWriter {
    output_dir: PathBuf,
    written: u64,
}

impl DebugImageWriter {
    pub fn create(output_dir: &str) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating debug directory {}", output_dir))?;
        info!("🖼️  Debug images will be written to {}", output_dir);
        Ok(Self {
            output_dir: PathBuf::from(output_dir),
            written: 0,
        })
    }

    pub fn path_for(&self, cycle: u64, category: DebugCategory) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.jpg", category.as_str(), cycle))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DebugSink for DebugImageWriter {
    fn record(&mut self, cycle: u64, category: DebugCategory, frame: &Mat) {
        if !category.wants(cycle) || frame.empty() {
            return;
        }

        let path = self.path_for(cycle, category);
        let Some(path_str) = path.to_str() else {
            warn!("Debug path is not valid UTF-8: {}", path.display());
            return;
        };

        match imgcodecs::imwrite_def(path_str, frame) {
            Ok(true) => self.written += 1,
            Ok(false) => warn!("Encoder refused debug frame {}", path.display()),
            Err(e) => warn!("Failed to write debug frame {}: {}", path.display(), e),
        }
    }

    fn finish(&mut self) -> Result<()> {
        info!(
            "🖼️  {} debug image(s) in {}",
            self.written(),
            self.output_dir.display()
        );
        Ok(())
    }
}
