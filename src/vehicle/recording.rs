use anyhow::{anyhow, Result};

use super::{Actuator, ActuatorCommand};
use crate::command::Direction;
use crate::steering::Velocity;

/// In-memory actuator that records every command. Used by tests and replays.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    pub commands: Vec<ActuatorCommand>,
    pub connected: bool,
    pub video_on: bool,
    /// When set, the next command is rejected with this message.
    pub reject_next: Option<String>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, command: ActuatorCommand) -> Result<()> {
        if let Some(reason) = self.reject_next.take() {
            return Err(anyhow!("vehicle rejected {:?}: {}", command, reason));
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn velocity_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, ActuatorCommand::SetVelocity(_)))
            .count()
    }

    pub fn move_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, ActuatorCommand::MoveRelative { .. }))
            .count()
    }
}

impl Actuator for RecordingActuator {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        self.video_on = true;
        Ok(())
    }

    fn stop_video(&mut self) -> Result<()> {
        self.video_on = false;
        Ok(())
    }

    fn takeoff(&mut self) -> Result<()> {
        self.record(ActuatorCommand::Takeoff)
    }

    fn land(&mut self) -> Result<()> {
        self.record(ActuatorCommand::Land)
    }

    fn move_relative(&mut self, direction: Direction, distance_cm: u32) -> Result<()> {
        self.record(ActuatorCommand::MoveRelative {
            direction,
            distance_cm,
        })
    }

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()> {
        self.record(ActuatorCommand::SetVelocity(velocity))
    }

    fn issue(&mut self, command: ActuatorCommand) -> Result<()> {
        self.record(command)
    }
}

/// Logs commands instead of flying.
#[derive(Debug, Default)]
pub struct DryRunActuator {
    issued: u64,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    fn log(&mut self, what: std::fmt::Arguments<'_>) -> Result<()> {
        self.issued += 1;
        log::info!("dry-run: {}", what);
        Ok(())
    }
}

impl Actuator for DryRunActuator {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("dry-run: connect");
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        log::info!("dry-run: video on");
        Ok(())
    }

    fn stop_video(&mut self) -> Result<()> {
        log::info!("dry-run: video off");
        Ok(())
    }

    fn takeoff(&mut self) -> Result<()> {
        self.log(format_args!("takeoff"))
    }

    fn land(&mut self) -> Result<()> {
        self.log(format_args!("land"))
    }

    fn move_relative(&mut self, direction: Direction, distance_cm: u32) -> Result<()> {
        self.log(format_args!("{} {}", direction.keyword(), distance_cm))
    }

    fn set_velocity(&mut self, v: Velocity) -> Result<()> {
        // Velocity setpoints arrive every frame; keep them out of info logs.
        self.issued += 1;
        log::debug!(
            "dry-run: rc {} {} {} {}",
            v.lateral,
            v.forward,
            v.vertical,
            v.yaw
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_recorded_as_issued() {
        let mut actuator = RecordingActuator::new();
        actuator.issue(ActuatorCommand::Stop).unwrap();
        assert_eq!(actuator.commands, vec![ActuatorCommand::Stop]);
    }

    #[test]
    fn rejection_is_reported_once() {
        let mut actuator = RecordingActuator::new();
        actuator.reject_next = Some("not airborne".to_string());
        let err = actuator.issue(ActuatorCommand::Land).unwrap_err();
        assert!(err.to_string().contains("not airborne"));
        assert!(actuator.commands.is_empty());

        actuator.issue(ActuatorCommand::Land).unwrap();
        assert_eq!(actuator.commands, vec![ActuatorCommand::Land]);
    }

    #[test]
    fn dry_run_counts_commands() {
        let mut actuator = DryRunActuator::new();
        actuator.issue(ActuatorCommand::Takeoff).unwrap();
        actuator
            .issue(ActuatorCommand::SetVelocity(Velocity::new(0, 30, 0, 5)))
            .unwrap();
        actuator.issue(ActuatorCommand::Stop).unwrap();
        assert_eq!(actuator.issued(), 3);
    }
}
