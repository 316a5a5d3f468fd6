// src/detection/smoother.rs
use std::time::Instant;

/// Temporal state behind the lane offset estimate.
///
/// Limits how far the estimate may jump between frames and holds the last
/// value through short gaps (dashed markings, glare) before giving up.
#[derive(Debug, Clone)]
pub struct LinePositionSmoother {
    last_position: Option<i32>,
    lost_frame_count: u32,
    last_detection_time: Option<Instant>,
    max_change: i32,
    max_lost_frames: u32,
}

impl LinePositionSmoother {
    pub fn new(max_change: i32, max_lost_frames: u32) -> Self {
        Self {
            last_position: None,
            lost_frame_count: 0,
            last_detection_time: None,
            max_change: max_change.max(0),
            max_lost_frames,
        }
    }

    /// Frame with no usable line: hold the last estimate until the lost
    /// budget is spent, then forget it.
    pub fn record_lost(&mut self) -> Option<i32> {
        self.lost_frame_count = self.lost_frame_count.saturating_add(1);
        if self.lost_frame_count > self.max_lost_frames {
            self.last_position = None;
            return None;
        }
        self.last_position
    }

    /// Frame with a measured offset: rate-limit it against the previous
    /// estimate and store the result.
    pub fn record_detection(&mut self, measured: i32, now: Instant) -> i32 {
        self.lost_frame_count = 0;

        let position = match self.last_position {
            Some(last) if (measured - last).abs() > self.max_change => {
                if measured > last {
                    last + self.max_change
                } else {
                    last - self.max_change
                }
            }
            _ => measured,
        };

        self.last_position = Some(position);
        self.last_detection_time = Some(now);
        position
    }

    pub fn last_position(&self) -> Option<i32> {
        self.last_position
    }

    pub fn lost_frame_count(&self) -> u32 {
        self.lost_frame_count
    }

    pub fn last_detection_time(&self) -> Option<Instant> {
        self.last_detection_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_detection_is_unclamped() {
        let mut s = LinePositionSmoother::new(20, 10);
        assert_eq!(s.record_detection(-150, Instant::now()), -150);
        assert_eq!(s.last_position(), Some(-150));
    }

    #[test]
    fn test_jump_is_clamped_toward_measurement() {
        let mut s = LinePositionSmoother::new(20, 10);
        s.record_detection(0, Instant::now());
        assert_eq!(s.record_detection(100, Instant::now()), 20);
        assert_eq!(s.record_detection(-100, Instant::now()), 0);
        assert_eq!(s.record_detection(10, Instant::now()), 10);
    }

    #[test]
    fn test_holds_then_forgets() {
        let mut s = LinePositionSmoother::new(20, 3);
        s.record_detection(42, Instant::now());
        for _ in 0..3 {
            assert_eq!(s.record_lost(), Some(42));
        }
        assert_eq!(s.record_lost(), None);
        assert_eq!(s.last_position(), None);
        assert_eq!(s.lost_frame_count(), 4);
    }

    #[test]
    fn test_detection_resets_lost_counter() {
        let mut s = LinePositionSmoother::new(20, 3);
        s.record_detection(5, Instant::now());
        s.record_lost();
        s.record_lost();
        s.record_detection(6, Instant::now());
        assert_eq!(s.lost_frame_count(), 0);
        assert!(s.last_detection_time().is_some());
    }

    #[test]
    fn test_lost_without_history_is_none() {
        let mut s = LinePositionSmoother::new(20, 3);
        assert_eq!(s.record_lost(), None);
    }
}
