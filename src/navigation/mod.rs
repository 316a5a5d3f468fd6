// src/navigation/mod.rs

mod command;
mod state_machine;

pub use command::MotorCommand;
pub use state_machine::{CycleReport, NavigationStateMachine, Trigger};
