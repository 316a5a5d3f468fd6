// src/detection/obstacle_detector.rs
//
// Color-segmented obstacle detection in the mid-distance band ahead of the
// vehicle. The band skips the near field (lane paint) and the far field
// (background clutter).

use super::types::{
    AvoidanceDirection, ColorReading, ObstacleObservation, ObstacleReading, ObstacleZone,
};
use crate::color_analysis::{color_pixel_counts, combined_mask, dominant_color};
use crate::debug::annotate_obstacles;
use crate::preprocessing::{crop_rows, ensure_bgr, open_close, to_hsv};
use crate::types::{Config, ObstacleConfig};
use anyhow::Result;
use opencv::{
    core::{Mat, Point, Rect, Vector},
    imgproc,
    prelude::*,
};
use tracing::{debug, warn};

pub struct ObstacleDetector {
    config: ObstacleConfig,
}

impl ObstacleDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.obstacle.clone(),
        }
    }

    fn roi(&self, frame: &Mat) -> Result<Mat> {
        ensure_bgr(frame)?;
        crop_rows(frame, self.config.roi_top, self.config.roi_bottom)
    }

    pub fn detect_obstacles(&self, frame: &Mat) -> Result<ObstacleReading> {
        let roi = self.roi(frame)?;
        let hsv = to_hsv(&roi)?;
        let mask = combined_mask(&hsv, &self.config.colors)?;
        let filtered = open_close(&mask, self.config.denoise_kernel)?;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours_def(
            &filtered,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
        )?;

        let mut boxes = Vec::new();
        let mut largest: Option<(f64, Rect)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area_def(&contour)?;
            if area < self.config.min_area {
                continue;
            }

            let rect = imgproc::bounding_rect(&contour)?;
            boxes.push(rect);
            match largest {
                Some((best, _)) if area <= best => {}
                _ => largest = Some((area, rect)),
            }
        }

        let zone = largest.map(|(area, rect)| {
            let cx = rect.x + rect.width / 2;
            let zone = ObstacleZone::from_column(cx, roi.cols());
            debug!(
                "Obstacle blob: area={:.0} cx={} zone={} ({} candidate(s))",
                area,
                cx,
                zone.as_str(),
                boxes.len()
            );
            zone
        });

        let debug_frame = annotate_obstacles(&roi, &boxes, zone.map(|z| z.as_str()))
            .unwrap_or_else(|e| {
                warn!("Obstacle annotation failed: {}", e);
                Mat::default()
            });

        Ok(ObstacleReading {
            present: zone.is_some(),
            zone,
            debug_frame,
        })
    }

    /// Dominant obstacle color and its share of the ROI.
    pub fn detect_obstacle_color(&self, frame: &Mat) -> Result<ColorReading> {
        let roi = self.roi(frame)?;
        let hsv = to_hsv(&roi)?;
        let counts = color_pixel_counts(&hsv, &self.config.colors, self.config.denoise_kernel)?;

        let total = roi.rows() as f32 * roi.cols() as f32;
        Ok(match dominant_color(&counts, self.config.min_area) {
            Some((name, pixels)) if total > 0.0 => ColorReading {
                color: Some(name.to_string()),
                confidence: pixels as f32 / total,
            },
            _ => ColorReading::none(),
        })
    }

    /// Presence, zone and color in one pass for logging.
    pub fn observe(&self, frame: &Mat) -> Result<(ObstacleObservation, Mat)> {
        let reading = self.detect_obstacles(frame)?;
        let color = if reading.present {
            self.detect_obstacle_color(frame).unwrap_or_else(|e| {
                warn!("Obstacle color check failed: {}", e);
                ColorReading::none()
            })
        } else {
            ColorReading::none()
        };

        Ok((
            ObstacleObservation {
                present: reading.present,
                zone: reading.zone,
                color: color.color,
                confidence: color.confidence,
            },
            reading.debug_frame,
        ))
    }
}

/// Which way to steer around an obstacle in `zone`.
///
/// A centered obstacle leaves no preferred side, so the vehicle backs up and
/// turns right. An unknown zone also turns right.
pub fn get_avoidance_direction(zone: Option<ObstacleZone>) -> AvoidanceDirection {
    match zone {
        Some(ObstacleZone::Left) => AvoidanceDirection::Right,
        Some(ObstacleZone::Right) => AvoidanceDirection::Left,
        Some(ObstacleZone::Center) => AvoidanceDirection::BackwardRight,
        None => AvoidanceDirection::Right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{self, Scalar};

    const ORANGE_BGR: (f64, f64, f64) = (0.0, 85.0, 255.0);
    const YELLOW_BGR: (f64, f64, f64) = (0.0, 212.0, 255.0);
    const BLUE_BGR: (f64, f64, f64) = (255.0, 0.0, 0.0);

    fn frame_with_blob(rect: Rect, bgr: (f64, f64, f64)) -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(480, 640, core::CV_8UC3, Scalar::all(0.0)).unwrap();
        imgproc::rectangle(
            &mut frame,
            rect,
            Scalar::new(bgr.0, bgr.1, bgr.2, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        frame
    }

    #[test]
    fn test_avoidance_table() {
        assert_eq!(
            get_avoidance_direction(Some(ObstacleZone::Left)),
            AvoidanceDirection::Right
        );
        assert_eq!(
            get_avoidance_direction(Some(ObstacleZone::Right)),
            AvoidanceDirection::Left
        );
        assert_eq!(
            get_avoidance_direction(Some(ObstacleZone::Center)),
            AvoidanceDirection::BackwardRight
        );
        assert_eq!(get_avoidance_direction(None), AvoidanceDirection::Right);
    }

    #[test]
    fn test_centered_orange_blob() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame = frame_with_blob(Rect::new(280, 140, 80, 60), ORANGE_BGR);

        let reading = detector.detect_obstacles(&frame).unwrap();
        assert!(reading.present);
        assert_eq!(reading.zone, Some(ObstacleZone::Center));
        assert_eq!(reading.debug_frame.rows(), 140);

        let color = detector.detect_obstacle_color(&frame).unwrap();
        assert_eq!(color.color.as_deref(), Some("orange"));
        let expected = (80.0 * 60.0) / (640.0 * 140.0);
        assert!((color.confidence - expected).abs() < 1e-6, "{}", color.confidence);
    }

    #[test]
    fn test_left_and_right_zones() {
        let detector = ObstacleDetector::new(&Config::default());
        let left = frame_with_blob(Rect::new(40, 140, 80, 60), ORANGE_BGR);
        let right = frame_with_blob(Rect::new(520, 140, 80, 60), YELLOW_BGR);

        assert_eq!(
            detector.detect_obstacles(&left).unwrap().zone,
            Some(ObstacleZone::Left)
        );
        assert_eq!(
            detector.detect_obstacles(&right).unwrap().zone,
            Some(ObstacleZone::Right)
        );
    }

    #[test]
    fn test_yellow_blob_color() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame = frame_with_blob(Rect::new(280, 140, 80, 60), YELLOW_BGR);
        let color = detector.detect_obstacle_color(&frame).unwrap();
        assert_eq!(color.color.as_deref(), Some("yellow"));
    }

    #[test]
    fn test_largest_blob_decides_zone() {
        let detector = ObstacleDetector::new(&Config::default());
        let mut frame = frame_with_blob(Rect::new(40, 150, 40, 40), ORANGE_BGR);
        imgproc::rectangle(
            &mut frame,
            Rect::new(500, 130, 100, 90),
            Scalar::new(ORANGE_BGR.0, ORANGE_BGR.1, ORANGE_BGR.2, 0.0),
            -1,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        let reading = detector.detect_obstacles(&frame).unwrap();
        assert_eq!(reading.zone, Some(ObstacleZone::Right));
    }

    #[test]
    fn test_small_blob_is_ignored() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame = frame_with_blob(Rect::new(300, 150, 12, 12), ORANGE_BGR);
        let reading = detector.detect_obstacles(&frame).unwrap();
        assert!(!reading.present);
        assert_eq!(reading.zone, None);
        assert_eq!(detector.detect_obstacle_color(&frame).unwrap(), ColorReading::none());
    }

    #[test]
    fn test_unconfigured_color_is_ignored() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame = frame_with_blob(Rect::new(280, 140, 80, 60), BLUE_BGR);
        assert!(!detector.detect_obstacles(&frame).unwrap().present);
    }

    #[test]
    fn test_blob_outside_band_is_ignored() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame = frame_with_blob(Rect::new(280, 380, 80, 60), ORANGE_BGR);
        assert!(!detector.detect_obstacles(&frame).unwrap().present);
    }

    #[test]
    fn test_short_frame_is_an_error() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame =
            Mat::new_rows_cols_with_default(200, 640, core::CV_8UC3, Scalar::all(0.0)).unwrap();
        assert!(detector.detect_obstacles(&frame).is_err());
    }

    #[test]
    fn test_observe_combines_zone_and_color() {
        let detector = ObstacleDetector::new(&Config::default());
        let frame = frame_with_blob(Rect::new(40, 140, 80, 60), ORANGE_BGR);
        let (obs, _) = detector.observe(&frame).unwrap();
        assert!(obs.present);
        assert_eq!(obs.zone, Some(ObstacleZone::Left));
        assert_eq!(obs.color.as_deref(), Some("orange"));
        assert!(obs.confidence > 0.0);
    }
}
