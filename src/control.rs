//! The per-frame control cycle.
//!
//! One cycle: acquire a frame, segment it, pick the dominant blob, poll at most
//! one command byte, update the mode, then issue at most one actuator command.
//! `step` holds the decision logic and touches no I/O; `ControlLoop` wires it
//! to a frame source, a command channel and an actuator.

use anyhow::{Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::blob::{select_dominant, Blob};
use crate::channel::CommandChannel;
use crate::color::ColorRangeProvider;
use crate::command::Command;
use crate::frame::{Frame, Mask};
use crate::ingest::FrameSource;
use crate::mode::{transition, Effect, Mode, ModePolicy};
use crate::segment::Segmenter;
use crate::steering::{SteeringLaw, Velocity};
use crate::vehicle::{Actuator, ActuatorCommand};

pub const DEFAULT_MOVE_DISTANCE_CM: u32 = 30;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What Auto mode steers toward when the current frame has no blob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoBlobPolicy {
    /// Reuse the last centroid seen; before any blob, the frame centre.
    #[default]
    HoldLast,
    /// Keep flying forward with zero yaw rate.
    ZeroYaw,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlSettings {
    pub steering: SteeringLaw,
    /// Distance for manual `forward|back|left|right` moves.
    pub move_distance_cm: u32,
    pub mode_policy: ModePolicy,
    pub no_blob: NoBlobPolicy,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            steering: SteeringLaw::default(),
            move_distance_cm: DEFAULT_MOVE_DISTANCE_CM,
            mode_policy: ModePolicy::default(),
            no_blob: NoBlobPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlLoopState {
    pub mode: Mode,
    /// Centroid of the most recent dominant blob, working-frame pixels.
    pub last_centroid: Option<(i32, i32)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    pub state: ControlLoopState,
    pub issued: Option<ActuatorCommand>,
    pub quit: bool,
}

/// Decide one cycle.
///
/// Manual mode never produces `SetVelocity`; Auto mode never produces a
/// discrete command.
pub fn step(
    state: ControlLoopState,
    blob: Option<&Blob>,
    command: Option<Command>,
    settings: &ControlSettings,
) -> StepOutcome {
    let seen = blob.map(Blob::centroid_px);
    let last_centroid = seen.or(state.last_centroid);
    let t = transition(state.mode, command, settings.mode_policy);

    let mut quit = false;
    let issued = match t.effect {
        Effect::None => None,
        Effect::Steer => Some(ActuatorCommand::SetVelocity(steer(
            seen,
            last_centroid,
            settings,
        ))),
        Effect::Takeoff => Some(ActuatorCommand::Takeoff),
        Effect::Land => Some(ActuatorCommand::Land),
        Effect::Move(direction) => Some(ActuatorCommand::MoveRelative {
            direction,
            distance_cm: settings.move_distance_cm,
        }),
        Effect::Quit => {
            quit = true;
            None
        }
    };

    StepOutcome {
        state: ControlLoopState {
            mode: t.next,
            last_centroid,
        },
        issued,
        quit,
    }
}

fn steer(
    seen: Option<(i32, i32)>,
    last_centroid: Option<(i32, i32)>,
    settings: &ControlSettings,
) -> Velocity {
    let law = &settings.steering;
    let target = match (seen, settings.no_blob) {
        (Some((x, _)), _) => x,
        (None, NoBlobPolicy::HoldLast) => last_centroid
            .map(|(x, _)| x)
            .unwrap_or(law.center_x.round() as i32),
        (None, NoBlobPolicy::ZeroYaw) => return Velocity::new(0, law.forward_speed, 0, 0),
    };
    law.velocity(target)
}

/// Everything one cycle saw and did, for display or recording.
#[derive(Clone, Debug)]
pub struct CycleArtifacts {
    pub frame: Frame,
    /// Frame resized to the working resolution.
    pub working: RgbImage,
    pub mask: Mask,
    pub blob: Option<Blob>,
    pub mode: Mode,
    pub command: Option<Command>,
    pub issued: Option<ActuatorCommand>,
    pub quit: bool,
}

/// Observer for per-cycle artifacts.
pub trait DebugSink {
    fn observe(&mut self, cycle: &CycleArtifacts);
}

/// Discards everything.
pub struct NullSink;

impl DebugSink for NullSink {
    fn observe(&mut self, _cycle: &CycleArtifacts) {}
}

impl<F: FnMut(&CycleArtifacts)> DebugSink for F {
    fn observe(&mut self, cycle: &CycleArtifacts) {
        self(cycle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub commands_issued: u64,
}

pub struct ControlLoop<S, C, A, P> {
    source: S,
    channel: C,
    actuator: A,
    segmenter: Segmenter<P>,
    settings: ControlSettings,
    state: ControlLoopState,
    cycles: u64,
    commands_issued: u64,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<S, C, A, P> ControlLoop<S, C, A, P>
where
    S: FrameSource,
    C: CommandChannel,
    A: Actuator,
    P: ColorRangeProvider,
{
    /// `source` and `actuator` are expected to be connected already.
    pub fn new(
        source: S,
        channel: C,
        actuator: A,
        segmenter: Segmenter<P>,
        settings: ControlSettings,
    ) -> Self {
        Self {
            source,
            channel,
            actuator,
            segmenter,
            settings,
            state: ControlLoopState::default(),
            cycles: 0,
            commands_issued: 0,
            shutdown: None,
        }
    }

    /// Stop `run` after the cycle in which `flag` becomes true.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn state(&self) -> ControlLoopState {
        self.state
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn into_parts(self) -> (S, C, A) {
        (self.source, self.channel, self.actuator)
    }

    /// Run one cycle. Frame and actuator errors are returned unretried.
    pub fn run_cycle(&mut self) -> Result<CycleArtifacts> {
        let frame = self
            .source
            .next_frame()
            .context("failed to acquire frame")?;
        let segmentation = self.segmenter.process(&frame)?;
        let blob = select_dominant(&segmentation.mask);

        let command = self.channel.poll().and_then(|byte| {
            let command = Command::from_byte(byte);
            if command.is_none() {
                log::debug!("ignoring command byte {:#04x}", byte);
            }
            command
        });

        let outcome = step(self.state, blob.as_ref(), command, &self.settings);
        if outcome.state.mode != self.state.mode {
            log::info!("mode {:?} -> {:?}", self.state.mode, outcome.state.mode);
        }
        self.state = outcome.state;
        self.cycles += 1;

        if let Some(issued) = outcome.issued {
            match issued {
                ActuatorCommand::SetVelocity(v) => log::debug!(
                    "steer centroid={:?} yaw={}",
                    blob.as_ref().map(Blob::centroid_px),
                    v.yaw
                ),
                other => log::info!("issuing {:?}", other),
            }
            self.actuator
                .issue(issued)
                .with_context(|| format!("{} rejected {:?}", self.actuator.name(), issued))?;
            self.commands_issued += 1;
        }
        if outcome.quit {
            log::info!("quit requested");
        }

        Ok(CycleArtifacts {
            frame,
            working: segmentation.working,
            mask: segmentation.mask,
            blob,
            mode: self.state.mode,
            command,
            issued: outcome.issued,
            quit: outcome.quit,
        })
    }

    /// Run until a quit command is processed or shutdown is signalled.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.run_with(&mut NullSink)
    }

    pub fn run_with(&mut self, sink: &mut dyn DebugSink) -> Result<RunSummary> {
        let mut last_health_log = Instant::now();
        loop {
            let cycle = self.run_cycle()?;
            sink.observe(&cycle);
            if cycle.quit {
                break;
            }
            if self
                .shutdown
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                log::info!("shutdown signal received after {} cycles", self.cycles);
                break;
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::info!(
                    "source health={} frames={} source={} mode={:?}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    stats.source,
                    self.state.mode
                );
                last_health_log = Instant::now();
            }
        }
        Ok(RunSummary {
            cycles: self.cycles,
            commands_issued: self.commands_issued,
        })
    }
}
