use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise run with the built-in calibration.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            return Self::load(path);
        }
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let speeds = [
            ("default_speed", self.motion.default_speed),
            ("turn_speed", self.motion.turn_speed),
            ("slow_speed", self.motion.slow_speed),
            ("curve_speed", self.motion.curve_speed),
        ];
        for (name, speed) in speeds {
            if !(0.0..=1.0).contains(&speed) {
                bail!("motion.{} must be within [0, 1], got {}", name, speed);
            }
        }

        if self.camera.width <= 0 || self.camera.height <= 0 {
            bail!(
                "camera resolution must be positive, got {}x{}",
                self.camera.width,
                self.camera.height
            );
        }

        if self.lane.roi_height <= 0 || self.lane.roi_height > self.camera.height {
            bail!(
                "lane.roi_height must be within 1..={}, got {}",
                self.camera.height,
                self.lane.roi_height
            );
        }
        if self.lane.blur_kernel <= 0 || self.lane.blur_kernel % 2 == 0 {
            bail!("lane.blur_kernel must be a positive odd number");
        }
        let kernels = [
            ("lane.morph_kernel", self.lane.morph_kernel),
            ("crosswalk.horizontal_kernel_width", self.crosswalk.horizontal_kernel_width),
            ("crosswalk.vertical_kernel_height", self.crosswalk.vertical_kernel_height),
            ("obstacle.denoise_kernel", self.obstacle.denoise_kernel),
        ];
        for (name, size) in kernels {
            if size <= 0 {
                bail!("{} must be positive, got {}", name, size);
            }
        }

        let durations = [
            ("crosswalk.stop_duration_s", self.crosswalk.stop_duration_s),
            ("crosswalk.rearm_s", self.crosswalk.rearm_s),
            ("obstacle.avoidance_duration_s", self.obstacle.avoidance_duration_s),
            ("obstacle.reverse_duration_s", self.obstacle.reverse_duration_s),
        ];
        for (name, secs) in durations {
            if !secs.is_finite() || secs < 0.0 {
                bail!("{} must be a finite, non-negative number of seconds", name);
            }
        }

        if self.crosswalk.roi_height <= 0 || self.crosswalk.roi_height > self.camera.height {
            bail!(
                "crosswalk.roi_height must be within 1..={}, got {}",
                self.camera.height,
                self.crosswalk.roi_height
            );
        }
        if !(0.0..=1.0).contains(&self.crosswalk.threshold) {
            bail!("crosswalk.threshold must be within [0, 1]");
        }

        let obstacle = &self.obstacle;
        if obstacle.roi_top < 0
            || obstacle.roi_bottom <= obstacle.roi_top
            || obstacle.roi_bottom > self.camera.height
        {
            bail!(
                "obstacle ROI [{}, {}) does not fit a frame of height {}",
                obstacle.roi_top,
                obstacle.roi_bottom,
                self.camera.height
            );
        }
        if obstacle.colors.is_empty() {
            bail!("obstacle.colors must name at least one color range");
        }
        for range in &obstacle.colors {
            if (0..3).any(|i| range.lower[i] > range.upper[i]) {
                bail!("color range '{}' has lower bound above upper bound", range.name);
            }
        }
        if obstacle.reverse_duration_s > obstacle.avoidance_duration_s {
            bail!(
                "obstacle.reverse_duration_s ({}) exceeds avoidance_duration_s ({})",
                obstacle.reverse_duration_s,
                obstacle.avoidance_duration_s
            );
        }

        if !(0.0..=1.0).contains(&self.motors.curve_ratio) {
            bail!("motors.curve_ratio must be within [0, 1]");
        }
        if self.motors.speed_deadband < 0.0 {
            bail!("motors.speed_deadband must not be negative");
        }
        if !self.motors.pwm_frequency_hz.is_finite() || self.motors.pwm_frequency_hz <= 0.0 {
            bail!("motors.pwm_frequency_hz must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DriverKind, LoggingConfig, PinNumbering};
    use std::path::PathBuf;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
lane:
  binary_threshold: 170
motors:
  pin_numbering: bcm
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lane.binary_threshold, 170.0);
        assert_eq!(config.lane.roi_height, 150);
        assert_eq!(config.motors.pin_numbering, PinNumbering::Bcm);
        assert_eq!(config.motors.active_pins().left.enable, 18);
        assert_eq!(config.obstacle.colors.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gpio_driver_section_parses() {
        let yaml = r#"
motors:
  driver: gpio
  pin_numbering: bcm
  pwm_frequency_hz: 500
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.motors.driver, DriverKind::Gpio);
        assert_eq!(config.motors.pwm_frequency_hz, 500.0);
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.motors.pwm_frequency_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_file_target() {
        let yaml = r#"
logging:
  level: debug
  file: logs/robot_log.txt
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let (dir, name) = config.logging.file_target().unwrap();
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, "robot_log.txt");

        let bare = LoggingConfig {
            file: Some("robot_log.txt".to_string()),
            ..LoggingConfig::default()
        };
        assert_eq!(
            bare.file_target(),
            Some((PathBuf::from("."), "robot_log.txt".to_string()))
        );
        assert_eq!(LoggingConfig::default().file_target(), None);
    }

    #[test]
    fn test_rejects_speed_out_of_range() {
        let mut config = Config::default();
        config.motion.turn_speed = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_obstacle_roi() {
        let mut config = Config::default();
        config.obstacle.roi_top = 300;
        config.obstacle.roi_bottom = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_reverse_longer_than_maneuver() {
        let mut config = Config::default();
        config.obstacle.reverse_duration_s = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_even_blur_kernel() {
        let mut config = Config::default();
        config.lane.blur_kernel = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_kernels() {
        let mut config = Config::default();
        config.obstacle.denoise_kernel = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crosswalk.horizontal_kernel_width = -3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crosswalk.vertical_kernel_height = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.lane.morph_kernel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_infinite_duration() {
        let yaml = r#"
crosswalk:
  stop_duration_s: .inf
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
        // the accessor itself must not panic on it
        assert_eq!(config.crosswalk.stop_duration(), std::time::Duration::ZERO);

        let mut config = Config::default();
        config.obstacle.avoidance_duration_s = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crosswalk.rearm_s = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.crosswalk.stop_duration_s, 5.0);
        assert_eq!(config.obstacle.colors[1].name, "yellow");
        assert_eq!(config.motors.pin_numbering, PinNumbering::Board);
        assert_eq!(config.logging.file.as_deref(), Some("robot_log.txt"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default("/nonexistent/lane-rover.yaml").unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.frame_center(), 320);
    }
}
