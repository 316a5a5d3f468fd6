// src/navigation/state_machine.rs
//
// Per-cycle behavior selection. Timed states are checked first, then the
// detectors run in fixed priority: obstacle, crosswalk, lane line.

use super::command::MotorCommand;
use crate::debug::{DebugCategory, DebugSink, NullDebugSink};
use crate::detection::{
    get_avoidance_direction, AvoidanceDirection, CrosswalkObservation, LineDetector,
    ObstacleDetector,
};
use crate::types::{Config, MotionConfig};
use opencv::core::Mat;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Cycles between dashed/solid diagnostics
const LANE_TYPE_EVERY: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManeuverPhase {
    Reversing,
    Turning,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RobotState {
    LineFollowing,
    AtCrosswalk {
        started_at: Instant,
    },
    AvoidingObstacle {
        started_at: Instant,
        direction: AvoidanceDirection,
        phase: ManeuverPhase,
    },
}

impl RobotState {
    pub fn name(&self) -> &'static str {
        match self {
            RobotState::LineFollowing => "line_following",
            RobotState::AtCrosswalk { .. } => "at_crosswalk",
            RobotState::AvoidingObstacle { .. } => "avoiding_obstacle",
        }
    }
}

/// Why a cycle produced its command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    CrosswalkHold,
    CrosswalkCleared,
    ManeuverInProgress,
    ManeuverComplete,
    ObstacleDetected(AvoidanceDirection),
    CrosswalkDetected,
    LineTracked(i32),
    LineLost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub command: MotorCommand,
    pub trigger: Trigger,
}

impl CycleReport {
    fn new(command: MotorCommand, trigger: Trigger) -> Self {
        Self { command, trigger }
    }
}

pub struct NavigationStateMachine {
    line: LineDetector,
    obstacles: ObstacleDetector,
    motion: MotionConfig,
    position_threshold: i32,
    stop_duration: Duration,
    crosswalk_rearm: Duration,
    avoidance_duration: Duration,
    reverse_duration: Duration,

    state: RobotState,
    crosswalk_cleared_at: Option<Instant>,
    cycle: u64,
    debug_sink: Box<dyn DebugSink>,
}

impl NavigationStateMachine {
    pub fn new(config: &Config) -> Self {
        Self {
            line: LineDetector::new(config),
            obstacles: ObstacleDetector::new(config),
            motion: config.motion.clone(),
            position_threshold: config.lane.position_threshold,
            stop_duration: config.crosswalk.stop_duration(),
            crosswalk_rearm: config.crosswalk.rearm(),
            avoidance_duration: config.obstacle.avoidance_duration(),
            reverse_duration: config.obstacle.reverse_duration(),
            state: RobotState::LineFollowing,
            crosswalk_cleared_at: None,
            cycle: 0,
            debug_sink: Box::new(NullDebugSink),
        }
    }

    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug_sink = sink;
        self
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn debug_sink_mut(&mut self) -> &mut dyn DebugSink {
        self.debug_sink.as_mut()
    }

    /// Decide this cycle's motor command. Never fails: detector faults are
    /// logged and count as "nothing seen".
    pub fn step(&mut self, frame: &Mat, now: Instant) -> CycleReport {
        let report = match self.state {
            RobotState::AtCrosswalk { started_at } => self.hold_at_crosswalk(started_at, now),
            RobotState::AvoidingObstacle {
                started_at,
                direction,
                phase,
            } => self.continue_maneuver(started_at, direction, phase, now),
            RobotState::LineFollowing => self.follow_line(frame, now),
        };

        debug!(
            "cycle {} [{}] {:?} -> {:?}",
            self.cycle,
            self.state.name(),
            report.trigger,
            report.command
        );
        self.cycle += 1;
        report
    }

    // ========================================================================
    // TIMED STATES
    // ========================================================================

    fn hold_at_crosswalk(&mut self, started_at: Instant, now: Instant) -> CycleReport {
        if now.saturating_duration_since(started_at) < self.stop_duration {
            return CycleReport::new(MotorCommand::Stop, Trigger::CrosswalkHold);
        }

        info!("🚦 Crosswalk wait over, resuming line following");
        self.state = RobotState::LineFollowing;
        self.crosswalk_cleared_at = Some(now);
        CycleReport::new(
            MotorCommand::Forward(self.motion.default_speed),
            Trigger::CrosswalkCleared,
        )
    }

    fn continue_maneuver(
        &mut self,
        started_at: Instant,
        direction: AvoidanceDirection,
        phase: ManeuverPhase,
        now: Instant,
    ) -> CycleReport {
        let elapsed = now.saturating_duration_since(started_at);

        if elapsed >= self.avoidance_duration {
            info!("✅ Avoidance ({}) complete", direction.as_str());
            self.state = RobotState::LineFollowing;
            return CycleReport::new(
                MotorCommand::Forward(self.motion.default_speed),
                Trigger::ManeuverComplete,
            );
        }

        let phase = if phase == ManeuverPhase::Reversing && elapsed >= self.reverse_duration {
            debug!("Reverse phase done after {:?}, turning", elapsed);
            ManeuverPhase::Turning
        } else {
            phase
        };
        self.state = RobotState::AvoidingObstacle {
            started_at,
            direction,
            phase,
        };

        CycleReport::new(
            self.maneuver_command(direction, phase),
            Trigger::ManeuverInProgress,
        )
    }

    fn maneuver_command(
        &self,
        direction: AvoidanceDirection,
        phase: ManeuverPhase,
    ) -> MotorCommand {
        match (phase, direction) {
            (ManeuverPhase::Reversing, _) => MotorCommand::Backward(self.motion.slow_speed),
            (_, AvoidanceDirection::Left | AvoidanceDirection::BackwardLeft) => {
                MotorCommand::TurnLeft(self.motion.turn_speed)
            }
            (_, AvoidanceDirection::Right | AvoidanceDirection::BackwardRight) => {
                MotorCommand::TurnRight(self.motion.turn_speed)
            }
        }
    }

    // ========================================================================
    // LINE FOLLOWING
    // ========================================================================

    fn follow_line(&mut self, frame: &Mat, now: Instant) -> CycleReport {
        if let Some(report) = self.check_obstacle(frame, now) {
            return report;
        }
        if let Some(report) = self.check_crosswalk(frame, now) {
            return report;
        }
        self.track_line(frame, now)
    }

    fn check_obstacle(&mut self, frame: &Mat, now: Instant) -> Option<CycleReport> {
        let (observation, debug_frame) = match self.obstacles.observe(frame) {
            Ok(result) => result,
            Err(e) => {
                warn!("Obstacle detection failed: {:#}", e);
                return None;
            }
        };
        self.debug_sink
            .record(self.cycle, DebugCategory::Obstacle, &debug_frame);

        if !observation.present {
            return None;
        }

        let direction = get_avoidance_direction(observation.zone);
        info!(
            "🚧 Obstacle {} ({}, {:.1}% of view), avoiding {}",
            observation.zone.map(|z| z.as_str()).unwrap_or("unknown"),
            observation.color.as_deref().unwrap_or("unclassified"),
            observation.confidence * 100.0,
            direction.as_str()
        );

        let phase = if direction.reverses_first() {
            ManeuverPhase::Reversing
        } else {
            ManeuverPhase::Turning
        };
        self.state = RobotState::AvoidingObstacle {
            started_at: now,
            direction,
            phase,
        };
        Some(CycleReport::new(
            self.maneuver_command(direction, phase),
            Trigger::ObstacleDetected(direction),
        ))
    }

    fn crosswalk_suppressed(&self, now: Instant) -> bool {
        self.crosswalk_cleared_at
            .map(|cleared| now.saturating_duration_since(cleared) < self.crosswalk_rearm)
            .unwrap_or(false)
    }

    fn check_crosswalk(&mut self, frame: &Mat, now: Instant) -> Option<CycleReport> {
        if self.crosswalk_suppressed(now) {
            return None;
        }

        let CrosswalkObservation {
            present,
            confidence,
            debug_frame,
        } = match self.line.is_crosswalk(frame) {
            Ok(observation) => observation,
            Err(e) => {
                warn!("Crosswalk detection failed: {:#}", e);
                return None;
            }
        };

        if !present {
            return None;
        }

        self.debug_sink
            .record(self.cycle, DebugCategory::Crosswalk, &debug_frame);
        info!(
            "🦓 Crosswalk detected (coverage {:.2}), stopping for {:?}",
            confidence, self.stop_duration
        );
        self.state = RobotState::AtCrosswalk { started_at: now };
        Some(CycleReport::new(MotorCommand::Stop, Trigger::CrosswalkDetected))
    }

    fn track_line(&mut self, frame: &Mat, now: Instant) -> CycleReport {
        let reading = match self.line.detect_line(frame, now) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Line detection failed: {:#}", e);
                return CycleReport::new(MotorCommand::Stop, Trigger::LineLost);
            }
        };
        self.debug_sink
            .record(self.cycle, DebugCategory::Line, &reading.debug_frame);

        let Some(offset) = reading.offset else {
            return CycleReport::new(MotorCommand::Stop, Trigger::LineLost);
        };

        if self.cycle % LANE_TYPE_EVERY == 0 {
            self.log_lane_type(frame);
        }

        let command = if offset.abs() < self.position_threshold {
            MotorCommand::Forward(self.motion.default_speed)
        } else if offset < 0 {
            MotorCommand::CurveLeft(self.motion.curve_speed)
        } else {
            MotorCommand::CurveRight(self.motion.curve_speed)
        };
        CycleReport::new(command, Trigger::LineTracked(offset))
    }

    fn log_lane_type(&self, frame: &Mat) {
        let result = self
            .line
            .lane_mask(frame)
            .and_then(|mask| self.line.detect_lane_type(&mask));
        match result {
            Ok((kind, confidence)) => {
                debug!("Lane marking: {} ({:.2})", kind.as_str(), confidence)
            }
            Err(e) => debug!("Lane marking check skipped: {:#}", e),
        }
    }
}
