//! Linetrace
//!
//! Visual line-following controller for a small camera drone.
//!
//! # Architecture
//!
//! Every camera frame goes through one control cycle:
//!
//! 1. **Segment**: resize to the working resolution, crop the region of
//!    interest, threshold in HSV, dilate.
//! 2. **Select**: label 8-connected regions and keep the largest.
//! 3. **Command**: poll at most one operator byte without blocking.
//! 4. **Decide**: update the Manual/Auto mode; in Auto, map the blob's
//!    horizontal centroid to a yaw rate while flying forward.
//! 5. **Actuate**: issue at most one command to the vehicle.
//!
//! # Module Structure
//!
//! - `frame`: frames, regions, binary masks
//! - `color`: HSV conversion and live-tunable colour ranges
//! - `segment`, `blob`, `steering`: the vision pipeline and control law
//! - `command`, `channel`, `mode`: operator input and control authority
//! - `vehicle`: actuator trait and the Tello SDK link
//! - `ingest`: frame sources
//! - `control`: the cycle itself
//! - `config`: file + environment configuration

pub mod blob;
pub mod channel;
pub mod color;
pub mod command;
pub mod config;
pub mod control;
pub mod frame;
pub mod ingest;
pub mod mode;
pub mod segment;
pub mod steering;
pub mod vehicle;

pub use blob::{label_regions, select_dominant, Blob, BoundingBox};
pub use channel::{CommandChannel, QueueChannel, UdpCommandChannel};
pub use color::{
    rgb_to_hsv, spawn_range_watcher, ColorRange, ColorRangeProvider, Hsv, SharedColorRange,
    StaticColorRange,
};
pub use command::{Command, Direction};
pub use config::LinetraceConfig;
pub use control::{
    step, ControlLoop, ControlLoopState, ControlSettings, CycleArtifacts, DebugSink, NoBlobPolicy,
    StepOutcome,
};
pub use frame::{Frame, Mask, Region};
pub use ingest::{open_source, FrameSource, SequenceSource, SourceConfig, SyntheticSource};
pub use mode::{Mode, ModePolicy};
pub use segment::{Segmentation, Segmenter, SegmenterConfig};
pub use steering::{SteeringLaw, Velocity};
pub use vehicle::{
    Actuator, ActuatorCommand, DryRunActuator, RecordingActuator, TelloConfig, TelloLink,
};
