// src/navigation/command.rs
use crate::motor::MotorActuator;

/// The single actuation decided in one control cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCommand {
    Forward(f32),
    Backward(f32),
    TurnLeft(f32),
    TurnRight(f32),
    CurveLeft(f32),
    CurveRight(f32),
    Stop,
}

impl MotorCommand {
    pub fn apply(&self, motors: &mut dyn MotorActuator) {
        match *self {
            MotorCommand::Forward(speed) => motors.forward(speed),
            MotorCommand::Backward(speed) => motors.backward(speed),
            MotorCommand::TurnLeft(speed) => motors.turn_left(speed),
            MotorCommand::TurnRight(speed) => motors.turn_right(speed),
            MotorCommand::CurveLeft(speed) => motors.curve_left(speed),
            MotorCommand::CurveRight(speed) => motors.curve_right(speed),
            MotorCommand::Stop => motors.stop(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MotorCommand::Forward(_) => "forward",
            MotorCommand::Backward(_) => "backward",
            MotorCommand::TurnLeft(_) => "turn_left",
            MotorCommand::TurnRight(_) => "turn_right",
            MotorCommand::CurveLeft(_) => "curve_left",
            MotorCommand::CurveRight(_) => "curve_right",
            MotorCommand::Stop => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[derive(Default)]
    struct CallLog(Vec<String>);

    impl MotorActuator for CallLog {
        fn forward(&mut self, speed: f32) {
            self.0.push(format!("forward {speed}"));
        }
        fn backward(&mut self, speed: f32) {
            self.0.push(format!("backward {speed}"));
        }
        fn turn_left(&mut self, speed: f32) {
            self.0.push(format!("turn_left {speed}"));
        }
        fn turn_right(&mut self, speed: f32) {
            self.0.push(format!("turn_right {speed}"));
        }
        fn curve_left(&mut self, speed: f32) {
            self.0.push(format!("curve_left {speed}"));
        }
        fn curve_right(&mut self, speed: f32) {
            self.0.push(format!("curve_right {speed}"));
        }
        fn stop(&mut self) {
            self.0.push("stop".to_string());
        }
        fn release(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_apply_dispatches_one_call() {
        let mut log = CallLog::default();
        MotorCommand::CurveRight(0.45).apply(&mut log);
        MotorCommand::Stop.apply(&mut log);
        assert_eq!(log.0, vec!["curve_right 0.45", "stop"]);
    }

    #[test]
    fn test_names_match_actuator_methods() {
        assert_eq!(MotorCommand::Backward(0.3).name(), "backward");
        assert_eq!(MotorCommand::TurnLeft(0.4).name(), "turn_left");
    }
}
