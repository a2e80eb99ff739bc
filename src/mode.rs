//! Manual / Auto control-authority state machine.
//!
//! | current | command           | next   | effect          |
//! |---------|-------------------|--------|-----------------|
//! | any     | `Auto`            | Auto   | none            |
//! | any     | `Manual`          | Manual | none            |
//! | Manual  | takeoff/land/move | Manual | discrete action |
//! | Manual  | `Quit`            | Manual | quit            |
//! | Manual  | nothing           | Manual | none            |
//! | Auto    | anything else     | Auto   | steer           |
//! | Auto    | nothing           | Auto   | steer           |
//!
//! A cycle that switches mode issues nothing; steering starts on the next one.

use serde::{Deserialize, Serialize};

use crate::command::{Command, Direction};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Manual,
    Auto,
}

/// Whether the operator may hand control to the line follower.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModePolicy {
    #[default]
    Switchable,
    /// Teleoperation only; `Auto` commands are ignored.
    ManualOnly,
}

/// What the current cycle asks of the vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Issue a velocity setpoint from the steering law.
    Steer,
    Takeoff,
    Land,
    Move(Direction),
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: Mode,
    pub effect: Effect,
}

impl Transition {
    fn stay(mode: Mode) -> Self {
        Self {
            next: mode,
            effect: Effect::None,
        }
    }

    /// No mode change: Auto keeps steering, Manual does nothing.
    fn idle(mode: Mode) -> Self {
        let effect = match mode {
            Mode::Auto => Effect::Steer,
            Mode::Manual => Effect::None,
        };
        Self { next: mode, effect }
    }
}

/// Apply at most one command to `mode`.
pub fn transition(mode: Mode, command: Option<Command>, policy: ModePolicy) -> Transition {
    let Some(command) = command else {
        return Transition::idle(mode);
    };
    match (mode, command) {
        (_, Command::Auto) if policy == ModePolicy::ManualOnly => Transition::idle(mode),
        (_, Command::Auto) => Transition::stay(Mode::Auto),
        (_, Command::Manual) => Transition::stay(Mode::Manual),
        (Mode::Auto, _) => Transition::idle(Mode::Auto),
        (Mode::Manual, Command::Takeoff) => Transition {
            next: Mode::Manual,
            effect: Effect::Takeoff,
        },
        (Mode::Manual, Command::Land) => Transition {
            next: Mode::Manual,
            effect: Effect::Land,
        },
        (Mode::Manual, Command::Move(direction)) => Transition {
            next: Mode::Manual,
            effect: Effect::Move(direction),
        },
        (Mode::Manual, Command::Quit) => Transition {
            next: Mode::Manual,
            effect: Effect::Quit,
        },
    }
}
