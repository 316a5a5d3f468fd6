// src/stats.rs

use crate::navigation::{CycleReport, Trigger};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RunStats {
    pub cycles: u64,
    pub skipped_captures: u64,
    pub commands: BTreeMap<&'static str, u64>,
    pub obstacle_events: u64,
    pub crosswalk_events: u64,
    pub line_lost_cycles: u64,
}

impl RunStats {
    pub fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        *self.commands.entry(report.command.name()).or_insert(0) += 1;
        match report.trigger {
            Trigger::ObstacleDetected(_) => self.obstacle_events += 1,
            Trigger::CrosswalkDetected => self.crosswalk_events += 1,
            Trigger::LineLost => self.line_lost_cycles += 1,
            _ => {}
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped_captures += 1;
    }

    pub fn log_summary(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.cycles as f64 / secs
        } else {
            0.0
        };

        info!("\n📊 Final Report:");
        info!("  Cycles: {} over {:.1}s", self.cycles, secs);
        info!("  ⏭️  Skipped Captures: {}", self.skipped_captures);
        info!("  🚧 Obstacles Avoided: {}", self.obstacle_events);
        info!("  🦓 Crosswalk Stops: {}", self.crosswalk_events);
        if self.line_lost_cycles > 0 {
            warn!("  ❓ Line Lost Cycles: {}", self.line_lost_cycles);
        } else {
            info!("  ❓ Line Lost Cycles: 0");
        }
        for (command, count) in &self.commands {
            info!("     {}: {}", command, count);
        }
        info!("  Control Rate: {:.1} Hz", rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::AvoidanceDirection;
    use crate::navigation::MotorCommand;

    #[test]
    fn test_counts_commands_and_events() {
        let mut stats = RunStats::default();
        stats.record(&CycleReport {
            command: MotorCommand::TurnRight(0.4),
            trigger: Trigger::ObstacleDetected(AvoidanceDirection::Right),
        });
        stats.record(&CycleReport {
            command: MotorCommand::TurnRight(0.4),
            trigger: Trigger::ManeuverInProgress,
        });
        stats.record(&CycleReport {
            command: MotorCommand::Stop,
            trigger: Trigger::LineLost,
        });
        stats.record_skipped();

        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.skipped_captures, 1);
        assert_eq!(stats.obstacle_events, 1);
        assert_eq!(stats.line_lost_cycles, 1);
        assert_eq!(stats.crosswalk_events, 0);
        assert_eq!(stats.commands.get("turn_right"), Some(&2));
        assert_eq!(stats.commands.get("stop"), Some(&1));
    }
}
