// src/detection/types.rs
use opencv::core::Mat;

/// Horizontal third of the obstacle ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleZone {
    Left,
    Center,
    Right,
}

impl ObstacleZone {
    /// Classify a column by thirds of `width`.
    pub fn from_column(cx: i32, width: i32) -> Self {
        if cx < width / 3 {
            ObstacleZone::Left
        } else if cx < 2 * width / 3 {
            ObstacleZone::Center
        } else {
            ObstacleZone::Right
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObstacleZone::Left => "left",
            ObstacleZone::Center => "center",
            ObstacleZone::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvoidanceDirection {
    Left,
    Right,
    BackwardLeft,
    BackwardRight,
}

impl AvoidanceDirection {
    /// Whether the maneuver backs up before turning.
    pub fn reverses_first(&self) -> bool {
        matches!(
            self,
            AvoidanceDirection::BackwardLeft | AvoidanceDirection::BackwardRight
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AvoidanceDirection::Left => "left",
            AvoidanceDirection::Right => "right",
            AvoidanceDirection::BackwardLeft => "backward_left",
            AvoidanceDirection::BackwardRight => "backward_right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneType {
    Dashed,
    Solid,
    Unknown,
}

impl LaneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneType::Dashed => "dashed",
            LaneType::Solid => "solid",
            LaneType::Unknown => "unknown",
        }
    }
}

/// Lane offset in pixels from the frame center (negative = line is left).
pub struct LineReading {
    pub offset: Option<i32>,
    pub debug_frame: Mat,
}

pub struct CrosswalkObservation {
    pub present: bool,
    /// Fraction of foreground pixels in the crosswalk ROI
    pub confidence: f32,
    pub debug_frame: Mat,
}

pub struct ObstacleReading {
    pub present: bool,
    pub zone: Option<ObstacleZone>,
    pub debug_frame: Mat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorReading {
    pub color: Option<String>,
    pub confidence: f32,
}

impl ColorReading {
    pub fn none() -> Self {
        Self {
            color: None,
            confidence: 0.0,
        }
    }
}

/// Everything known about the obstacle in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleObservation {
    pub present: bool,
    pub zone: Option<ObstacleZone>,
    pub color: Option<String>,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_thirds() {
        assert_eq!(ObstacleZone::from_column(0, 640), ObstacleZone::Left);
        assert_eq!(ObstacleZone::from_column(212, 640), ObstacleZone::Left);
        assert_eq!(ObstacleZone::from_column(213, 640), ObstacleZone::Center);
        assert_eq!(ObstacleZone::from_column(425, 640), ObstacleZone::Center);
        assert_eq!(ObstacleZone::from_column(426, 640), ObstacleZone::Right);
        assert_eq!(ObstacleZone::from_column(639, 640), ObstacleZone::Right);
    }
}
