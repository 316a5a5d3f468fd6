// src/detection/mod.rs

mod line_detector;
mod obstacle_detector;
mod smoother;
mod types;

// Re-export public APIs
pub use line_detector::LineDetector;
pub use obstacle_detector::{get_avoidance_direction, ObstacleDetector};
pub use types::*;
