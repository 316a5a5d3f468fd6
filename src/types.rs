use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub track: TrackConfig,
    pub lane: LaneConfig,
    pub crosswalk: CrosswalkConfig,
    pub obstacle: ObstacleConfig,
    pub motion: MotionConfig,
    pub motors: MotorConfig,
    pub control: ControlConfig,
    pub debug: DebugConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 device index used when `source_path` is unset
    pub device_index: i32,
    /// Video file or image directory to replay instead of a live camera
    pub source_path: Option<String>,
    pub width: i32,
    pub height: i32,
    pub framerate: f64,
    pub warmup_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            source_path: None,
            width: 640,
            height: 480,
            framerate: 30.0,
            warmup_ms: 2000,
        }
    }
}

impl CameraConfig {
    pub fn frame_center(&self) -> i32 {
        self.width / 2
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Physical track dimensions, used to size the lane strip in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub track_width_cm: f32,
    pub lane_width_cm: f32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            track_width_cm: 100.0,
            lane_width_cm: 40.0,
        }
    }
}

impl TrackConfig {
    pub fn lane_width_px(&self, frame_width: i32) -> i32 {
        if self.track_width_cm <= 0.0 {
            return 0;
        }
        ((self.lane_width_cm / self.track_width_cm) * frame_width as f32) as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub roi_height: i32,
    pub binary_threshold: f64,
    pub blur_kernel: i32,
    pub morph_kernel: i32,
    pub min_pixels: u32,
    pub max_change: i32,
    pub max_lost_frames: u32,
    pub position_threshold: i32,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            roi_height: 150,
            binary_threshold: 150.0,
            blur_kernel: 5,
            morph_kernel: 3,
            min_pixels: 50,
            max_change: 20,
            max_lost_frames: 10,
            position_threshold: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosswalkConfig {
    pub roi_height: i32,
    pub threshold: f32,
    pub stop_duration_s: f64,
    /// Ignore crosswalks for this long after leaving one (0 = never ignore)
    pub rearm_s: f64,
    pub horizontal_kernel_width: i32,
    pub vertical_kernel_height: i32,
}

impl Default for CrosswalkConfig {
    fn default() -> Self {
        Self {
            roi_height: 100,
            threshold: 0.5,
            stop_duration_s: 5.0,
            rearm_s: 0.0,
            horizontal_kernel_width: 20,
            vertical_kernel_height: 10,
        }
    }
}

/// Non-negative seconds as a `Duration`; values that do not fit become zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

impl CrosswalkConfig {
    pub fn stop_duration(&self) -> Duration {
        seconds(self.stop_duration_s)
    }

    pub fn rearm(&self) -> Duration {
        seconds(self.rearm_s)
    }
}

/// HSV bounds in OpenCV units (H 0-179, S/V 0-255).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRange {
    pub name: String,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(name: &str, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            name: name.to_string(),
            lower,
            upper,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub roi_top: i32,
    pub roi_bottom: i32,
    pub min_area: f64,
    pub denoise_kernel: i32,
    pub avoidance_duration_s: f64,
    pub reverse_duration_s: f64,
    pub colors: Vec<ColorRange>,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            roi_top: 100,
            roi_bottom: 240,
            min_area: 500.0,
            denoise_kernel: 5,
            avoidance_duration_s: 2.5,
            reverse_duration_s: 1.0,
            colors: vec![
                ColorRange::new("orange", [5, 100, 150], [15, 255, 255]),
                ColorRange::new("yellow", [20, 100, 150], [30, 255, 255]),
            ],
        }
    }
}

impl ObstacleConfig {
    pub fn avoidance_duration(&self) -> Duration {
        seconds(self.avoidance_duration_s)
    }

    pub fn reverse_duration(&self) -> Duration {
        seconds(self.reverse_duration_s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub default_speed: f32,
    pub turn_speed: f32,
    pub slow_speed: f32,
    pub curve_speed: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            default_speed: 0.5,
            turn_speed: 0.4,
            slow_speed: 0.3,
            curve_speed: 0.45,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinNumbering {
    Board,
    Bcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Log wheel outputs only
    DryRun,
    /// H-bridge on the Raspberry Pi header through rppal
    Gpio,
}

/// Enable + two direction pins for one H-bridge channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelPins {
    pub enable: u8,
    pub in1: u8,
    pub in2: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLayout {
    pub left: WheelPins,
    pub right: WheelPins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub driver: DriverKind,
    pub pin_numbering: PinNumbering,
    pub board_pins: PinLayout,
    pub bcm_pins: PinLayout,
    /// Duty changes smaller than this on both wheels are not re-applied
    pub speed_deadband: f32,
    /// Inner wheel duty as a fraction of the outer wheel while curving
    pub curve_ratio: f32,
    /// Software PWM frequency on the enable pins
    pub pwm_frequency_hz: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::DryRun,
            pin_numbering: PinNumbering::Board,
            board_pins: PinLayout {
                left: WheelPins {
                    enable: 12,
                    in1: 16,
                    in2: 18,
                },
                right: WheelPins {
                    enable: 32,
                    in1: 36,
                    in2: 38,
                },
            },
            bcm_pins: PinLayout {
                left: WheelPins {
                    enable: 18,
                    in1: 23,
                    in2: 24,
                },
                right: WheelPins {
                    enable: 12,
                    in1: 16,
                    in2: 20,
                },
            },
            speed_deadband: 0.05,
            curve_ratio: 0.4,
            pwm_frequency_hz: 100.0,
        }
    }
}

impl MotorConfig {
    /// Pin layout for the configured numbering scheme.
    pub fn active_pins(&self) -> PinLayout {
        match self.pin_numbering {
            PinNumbering::Board => self.board_pins,
            PinNumbering::Bcm => self.bcm_pins,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub cycle_interval_ms: u64,
    pub capture_retry_delay_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 50,
            capture_retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub output_dir: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: "debug_images".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Plain-text copy of the console log, appended across runs
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Directory and file name of the log file, if one is configured.
    pub fn file_target(&self) -> Option<(PathBuf, String)> {
        let path = Path::new(self.file.as_deref()?);
        let name = path.file_name()?.to_string_lossy().into_owned();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Some((dir, name))
    }
}

/// One captured camera image plus its position in the run.
#[derive(Debug)]
pub struct Frame {
    pub image: Mat,
    pub index: u64,
    pub captured_at: Instant,
}

/// Outcome of constructing a hardware handle.
///
/// Callers never see a half-initialized device: either the handle is fully
/// usable or they get the reason it is not.
pub enum Device<T> {
    Ready(T),
    Unavailable { reason: String },
}

impl<T> Device<T> {
    pub fn from_result(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(handle) => Device::Ready(handle),
            Err(e) => Device::Unavailable {
                reason: format!("{:#}", e),
            },
        }
    }
}
