// src/shutdown.rs

use crate::camera::FrameSource;
use crate::debug::DebugSink;
use crate::motor::MotorActuator;
use anyhow::Result;
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub failures: Vec<(&'static str, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: &'static str, result: Result<()>) {
        if let Err(e) = result {
            error!("Shutdown step '{}' failed: {:#}", step, e);
            self.failures.push((step, format!("{:#}", e)));
        }
    }
}

/// Bring the robot to rest and hand back every resource. Every step runs
/// even when an earlier one failed.
pub fn shutdown(
    motors: &mut dyn MotorActuator,
    source: &mut dyn FrameSource,
    debug_sink: &mut dyn DebugSink,
) -> ShutdownReport {
    info!("🛑 Shutting down");
    let mut report = ShutdownReport::default();

    motors.stop();
    report.record("release motors", motors.release());
    report.record("release frame source", source.release());
    report.record("finish debug output", debug_sink.finish());

    if report.is_clean() {
        info!("✓ Shutdown complete");
    } else {
        error!("Shutdown finished with {} failure(s)", report.failures.len());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::DebugCategory;
    use anyhow::bail;
    use opencv::core::Mat;

    #[derive(Default)]
    struct FakeMotors {
        calls: Vec<&'static str>,
        fail_release: bool,
    }

    impl MotorActuator for FakeMotors {
        fn forward(&mut self, _speed: f32) {}
        fn backward(&mut self, _speed: f32) {}
        fn turn_left(&mut self, _speed: f32) {}
        fn turn_right(&mut self, _speed: f32) {}
        fn curve_left(&mut self, _speed: f32) {}
        fn curve_right(&mut self, _speed: f32) {}
        fn stop(&mut self) {
            self.calls.push("stop");
        }
        fn release(&mut self) -> Result<()> {
            self.calls.push("release");
            if self.fail_release {
                bail!("pwm still busy");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSource {
        released: bool,
        fail: bool,
    }

    impl FrameSource for FakeSource {
        fn capture(&mut self) -> Result<Option<Mat>> {
            Ok(None)
        }
        fn release(&mut self) -> Result<()> {
            self.released = true;
            if self.fail {
                bail!("device gone");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        finished: bool,
    }

    impl DebugSink for FakeSink {
        fn record(&mut self, _cycle: u64, _category: DebugCategory, _frame: &Mat) {}
        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    #[test]
    fn test_clean_shutdown() {
        let mut motors = FakeMotors::default();
        let mut source = FakeSource::default();
        let mut sink = FakeSink::default();

        let report = shutdown(&mut motors, &mut source, &mut sink);
        assert!(report.is_clean());
        assert_eq!(motors.calls, vec!["stop", "release"]);
        assert!(source.released);
        assert!(sink.finished);
    }

    #[test]
    fn test_failures_do_not_skip_later_steps() {
        let mut motors = FakeMotors {
            fail_release: true,
            ..Default::default()
        };
        let mut source = FakeSource {
            fail: true,
            ..Default::default()
        };
        let mut sink = FakeSink::default();

        let report = shutdown(&mut motors, &mut source, &mut sink);
        assert!(!report.is_clean());
        let steps: Vec<_> = report.failures.iter().map(|(step, _)| *step).collect();
        assert_eq!(steps, vec!["release motors", "release frame source"]);
        assert!(source.released);
        assert!(sink.finished);
    }
}
