// src/motor.rs
//
// Differential-drive actuation: one controller that turns movement commands
// into per-wheel duty/direction, and a driver seam for the H-bridge backend.

use crate::types::{Device, DriverKind, MotorConfig, PinLayout, PinNumbering, WheelPins};
use anyhow::{Context, Result};
use rppal::gpio::{Gpio, Level, OutputPin};
use tracing::{debug, info, warn};

/// Movement interface the navigation layer drives. Calls are
/// fire-and-forget: failures are logged here and superseded by the next
/// cycle's command.
pub trait MotorActuator {
    fn forward(&mut self, speed: f32);
    fn backward(&mut self, speed: f32);
    fn turn_left(&mut self, speed: f32);
    fn turn_right(&mut self, speed: f32);
    fn curve_left(&mut self, speed: f32);
    fn curve_right(&mut self, speed: f32);
    fn stop(&mut self);
    fn release(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Forward,
    Backward,
    Coast,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelOutput {
    /// PWM duty cycle in [0, 1]
    pub duty: f32,
    pub spin: Spin,
}

impl WheelOutput {
    fn new(duty: f32, spin: Spin) -> Self {
        Self { duty, spin }
    }

    fn idle() -> Self {
        Self::new(0.0, Spin::Coast)
    }
}

/// H-bridge backend for the two drive wheels.
pub trait WheelDriver {
    fn apply(&mut self, left: WheelOutput, right: WheelOutput) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    CurveLeft,
    CurveRight,
    Stop,
}

impl Movement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::Forward => "forward",
            Movement::Backward => "backward",
            Movement::TurnLeft => "turn_left",
            Movement::TurnRight => "turn_right",
            Movement::CurveLeft => "curve_left",
            Movement::CurveRight => "curve_right",
            Movement::Stop => "stop",
        }
    }
}

pub struct MotorController<D: WheelDriver> {
    driver: D,
    speed_deadband: f32,
    curve_ratio: f32,
    last_movement: Movement,
    last_left: WheelOutput,
    last_right: WheelOutput,
}

impl<D: WheelDriver> MotorController<D> {
    pub fn new(driver: D, config: &MotorConfig) -> Self {
        Self {
            driver,
            speed_deadband: config.speed_deadband,
            curve_ratio: config.curve_ratio,
            last_movement: Movement::Stop,
            last_left: WheelOutput::idle(),
            last_right: WheelOutput::idle(),
        }
    }

    /// Per-wheel outputs for `movement` at `speed` (already clamped).
    fn mix(&self, movement: Movement, speed: f32) -> (WheelOutput, WheelOutput) {
        use Spin::{Backward, Forward};
        let out = WheelOutput::new;
        let inner = speed * self.curve_ratio;
        match movement {
            Movement::Forward => (out(speed, Forward), out(speed, Forward)),
            Movement::Backward => (out(speed, Backward), out(speed, Backward)),
            // pivot: inner wheel reversed at zero duty, outer wheel driving
            Movement::TurnLeft => (out(0.0, Backward), out(speed, Forward)),
            Movement::TurnRight => (out(speed, Forward), out(0.0, Backward)),
            Movement::CurveLeft => (out(inner, Forward), out(speed, Forward)),
            Movement::CurveRight => (out(speed, Forward), out(inner, Forward)),
            Movement::Stop => (WheelOutput::idle(), WheelOutput::idle()),
        }
    }

    fn drive(&mut self, movement: Movement, speed: f32) {
        let speed = speed.clamp(0.0, 1.0);

        if movement != self.last_movement {
            debug!("Movement: {} (speed {:.2})", movement.as_str(), speed);
            self.last_movement = movement;
        }

        let (left, right) = self.mix(movement, speed);

        // Dead-band: skip near-duplicate duty updates unless a wheel changes direction
        let same_spin = left.spin == self.last_left.spin && right.spin == self.last_right.spin;
        let small_change = (left.duty - self.last_left.duty).abs() < self.speed_deadband
            && (right.duty - self.last_right.duty).abs() < self.speed_deadband;
        if same_spin && small_change {
            return;
        }

        match self.driver.apply(left, right) {
            Ok(()) => {
                self.last_left = left;
                self.last_right = right;
            }
            Err(e) => warn!("Motor command {} failed: {}", movement.as_str(), e),
        }
    }
}

impl<D: WheelDriver> MotorActuator for MotorController<D> {
    fn forward(&mut self, speed: f32) {
        self.drive(Movement::Forward, speed);
    }

    fn backward(&mut self, speed: f32) {
        self.drive(Movement::Backward, speed);
    }

    fn turn_left(&mut self, speed: f32) {
        self.drive(Movement::TurnLeft, speed);
    }

    fn turn_right(&mut self, speed: f32) {
        self.drive(Movement::TurnRight, speed);
    }

    fn curve_left(&mut self, speed: f32) {
        self.drive(Movement::CurveLeft, speed);
    }

    fn curve_right(&mut self, speed: f32) {
        self.drive(Movement::CurveRight, speed);
    }

    fn stop(&mut self) {
        self.drive(Movement::Stop, 0.0);
    }

    fn release(&mut self) -> Result<()> {
        info!("Releasing motor outputs");
        self.driver.release()
    }
}

/// Logs wheel outputs against the configured pin map without touching GPIO.
pub struct DryRunDriver {
    pins: PinLayout,
    applied: u64,
}

impl DryRunDriver {
    pub fn new(pins: PinLayout) -> Self {
        Self { pins, applied: 0 }
    }
}

impl WheelDriver for DryRunDriver {
    fn apply(&mut self, left: WheelOutput, right: WheelOutput) -> Result<()> {
        self.applied += 1;
        debug!(
            "wheels L[en={} in={}/{}] {:?} {:.2} | R[en={} in={}/{}] {:?} {:.2}",
            self.pins.left.enable,
            self.pins.left.in1,
            self.pins.left.in2,
            left.spin,
            left.duty,
            self.pins.right.enable,
            self.pins.right.in1,
            self.pins.right.in2,
            right.spin,
            right.duty
        );
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        info!("Dry-run driver released after {} update(s)", self.applied);
        Ok(())
    }
}

// ============================================================================
// RASPBERRY PI GPIO
// ============================================================================

/// BCM channel wired to a physical pin of the 40-pin header.
fn board_to_bcm(pin: u8) -> Option<u8> {
    let bcm = match pin {
        3 => 2,
        5 => 3,
        7 => 4,
        8 => 14,
        10 => 15,
        11 => 17,
        12 => 18,
        13 => 27,
        15 => 22,
        16 => 23,
        18 => 24,
        19 => 10,
        21 => 9,
        22 => 25,
        23 => 11,
        24 => 8,
        26 => 7,
        27 => 0,
        28 => 1,
        29 => 5,
        31 => 6,
        32 => 12,
        33 => 13,
        35 => 19,
        36 => 16,
        37 => 26,
        38 => 20,
        40 => 21,
        _ => return None,
    };
    Some(bcm)
}

/// Configured pin layout in BCM channels, which is what rppal addresses.
fn bcm_layout(config: &MotorConfig) -> Result<PinLayout> {
    let layout = config.active_pins();
    if config.pin_numbering == PinNumbering::Bcm {
        return Ok(layout);
    }

    let map = |pin: u8| {
        board_to_bcm(pin).with_context(|| format!("board pin {} is not a GPIO pin", pin))
    };
    let wheel = |pins: WheelPins| -> Result<WheelPins> {
        Ok(WheelPins {
            enable: map(pins.enable)?,
            in1: map(pins.in1)?,
            in2: map(pins.in2)?,
        })
    };
    Ok(PinLayout {
        left: wheel(layout.left)?,
        right: wheel(layout.right)?,
    })
}

/// IN1/IN2 levels for a spin direction. Coast leaves both low.
fn direction_levels(spin: Spin) -> (Level, Level) {
    match spin {
        Spin::Forward => (Level::High, Level::Low),
        Spin::Backward => (Level::Low, Level::High),
        Spin::Coast => (Level::Low, Level::Low),
    }
}

struct GpioWheel {
    enable: OutputPin,
    in1: OutputPin,
    in2: OutputPin,
}

impl GpioWheel {
    fn open(gpio: &Gpio, pins: WheelPins) -> Result<Self> {
        let output = |pin: u8| -> Result<OutputPin> {
            Ok(gpio
                .get(pin)
                .with_context(|| format!("claiming GPIO {}", pin))?
                .into_output_low())
        };
        Ok(Self {
            enable: output(pins.enable)?,
            in1: output(pins.in1)?,
            in2: output(pins.in2)?,
        })
    }

    fn set(&mut self, output: WheelOutput, frequency: f64) -> Result<()> {
        let (in1, in2) = direction_levels(output.spin);
        self.in1.write(in1);
        self.in2.write(in2);

        if output.duty > 0.0 {
            self.enable
                .set_pwm_frequency(frequency, output.duty as f64)
                .context("setting enable PWM")?;
        } else {
            self.enable.clear_pwm()?;
            self.enable.set_low();
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.enable.clear_pwm()?;
        self.enable.set_low();
        self.in1.set_low();
        self.in2.set_low();
        Ok(())
    }
}

/// L298N-style H-bridge: software PWM on each enable pin, direction on
/// IN1/IN2. Pins return to their previous mode when the driver is dropped.
pub struct GpioDriver {
    left: GpioWheel,
    right: GpioWheel,
    frequency: f64,
}

impl GpioDriver {
    pub fn open(config: &MotorConfig) -> Result<Self> {
        let pins = bcm_layout(config)?;
        let gpio = Gpio::new().context("opening GPIO")?;
        let driver = Self {
            left: GpioWheel::open(&gpio, pins.left).context("left wheel")?,
            right: GpioWheel::open(&gpio, pins.right).context("right wheel")?,
            frequency: config.pwm_frequency_hz,
        };
        info!(
            "🔌 GPIO driver ready (BCM L {}/{}/{} R {}/{}/{}, {} Hz)",
            pins.left.enable,
            pins.left.in1,
            pins.left.in2,
            pins.right.enable,
            pins.right.in1,
            pins.right.in2,
            config.pwm_frequency_hz
        );
        Ok(driver)
    }
}

impl WheelDriver for GpioDriver {
    fn apply(&mut self, left: WheelOutput, right: WheelOutput) -> Result<()> {
        self.left.set(left, self.frequency)?;
        self.right.set(right, self.frequency)
    }

    fn release(&mut self) -> Result<()> {
        // attempt both wheels even if the first fails
        let left = self.left.release();
        let right = self.right.release();
        left.and(right)?;
        info!("GPIO motor pins released");
        Ok(())
    }
}

fn stopped<D: WheelDriver + 'static>(driver: D, config: &MotorConfig) -> Box<dyn MotorActuator> {
    let mut controller = MotorController::new(driver, config);
    controller.stop();
    Box::new(controller)
}

/// Build the motor controller selected by configuration. A GPIO backend that
/// cannot reach the header comes back `Unavailable`.
pub fn open_motors(config: &MotorConfig) -> Device<Box<dyn MotorActuator>> {
    let pins = config.active_pins();
    info!(
        "Motor pins ({:?}): left en={} in={}/{} | right en={} in={}/{}",
        config.pin_numbering,
        pins.left.enable,
        pins.left.in1,
        pins.left.in2,
        pins.right.enable,
        pins.right.in1,
        pins.right.in2
    );

    match config.driver {
        DriverKind::DryRun => Device::Ready(stopped(DryRunDriver::new(pins), config)),
        DriverKind::Gpio => {
            Device::from_result(GpioDriver::open(config).map(|driver| stopped(driver, config)))
        }
    }
}
