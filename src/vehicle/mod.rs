//! Vehicle actuation.
//!
//! The control loop speaks to the vehicle only through `Actuator`. The vehicle
//! is assumed to apply its own safety limits; nothing here retries a command.

mod recording;
pub mod tello;

pub use recording::{DryRunActuator, RecordingActuator};
pub use tello::{TelloConfig, TelloLink};

use anyhow::Result;

use crate::command::Direction;
use crate::steering::Velocity;

/// One motion command, issued at most once per control cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuatorCommand {
    Takeoff,
    Land,
    MoveRelative {
        direction: Direction,
        distance_cm: u32,
    },
    SetVelocity(Velocity),
    /// Zero velocity setpoint.
    Stop,
}

pub trait Actuator {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn connect(&mut self) -> Result<()>;

    fn start_video(&mut self) -> Result<()>;

    fn stop_video(&mut self) -> Result<()>;

    fn takeoff(&mut self) -> Result<()>;

    fn land(&mut self) -> Result<()>;

    fn move_relative(&mut self, direction: Direction, distance_cm: u32) -> Result<()>;

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()>;

    /// Dispatch a command to the matching method.
    fn issue(&mut self, command: ActuatorCommand) -> Result<()> {
        match command {
            ActuatorCommand::Takeoff => self.takeoff(),
            ActuatorCommand::Land => self.land(),
            ActuatorCommand::MoveRelative {
                direction,
                distance_cm,
            } => self.move_relative(direction, distance_cm),
            ActuatorCommand::SetVelocity(velocity) => self.set_velocity(velocity),
            ActuatorCommand::Stop => self.set_velocity(Velocity::default()),
        }
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn start_video(&mut self) -> Result<()> {
        (**self).start_video()
    }

    fn stop_video(&mut self) -> Result<()> {
        (**self).stop_video()
    }

    fn takeoff(&mut self) -> Result<()> {
        (**self).takeoff()
    }

    fn land(&mut self) -> Result<()> {
        (**self).land()
    }

    fn move_relative(&mut self, direction: Direction, distance_cm: u32) -> Result<()> {
        (**self).move_relative(direction, distance_cm)
    }

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()> {
        (**self).set_velocity(velocity)
    }

    fn issue(&mut self, command: ActuatorCommand) -> Result<()> {
        (**self).issue(command)
    }
}
