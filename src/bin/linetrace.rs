//! linetrace - line-following controller
//!
//! Connects to the vehicle, starts its video stream, and runs the control
//! cycle until the operator sends `q` in Manual mode or Ctrl-C is pressed.
//! Operator bytes arrive on a local UDP socket (`1` auto, `0` manual,
//! `t`/`l` takeoff/land, `w`/`s`/`a`/`d` move, `q` quit).

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linetrace::{
    config::LinetraceConfig, open_source, spawn_range_watcher, Actuator, ActuatorCommand,
    ControlLoop, DryRunActuator, Hsv, Mode, ModePolicy, Segmenter, SharedColorRange, TelloLink,
    UdpCommandChannel,
};

const VEHICLE_COMMAND_PORT: u16 = 8889;
const TUNE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON or TOML configuration file.
    #[arg(long, env = "LINETRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Vehicle IP address (command port 8889 is implied).
    #[arg(long)]
    tello_ip: Option<String>,

    /// Lower HSV bound, OpenCV scale (hue 0-179).
    #[arg(long, num_args = 3, value_names = ["H", "S", "V"])]
    hsv_min: Option<Vec<u8>>,

    /// Upper HSV bound, OpenCV scale (hue 0-179).
    #[arg(long, num_args = 3, value_names = ["H", "S", "V"])]
    hsv_max: Option<Vec<u8>>,

    /// Frame source: stub://rope, stub://floor, an image file or a directory.
    #[arg(long)]
    source: Option<String>,

    /// Log vehicle commands instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Allow a `stub://` source while commanding a real vehicle.
    #[arg(long)]
    allow_synthetic: bool,

    /// Teleoperation only; the auto command is ignored.
    #[arg(long)]
    manual_only: bool,

    /// JSON file `{"min":[h,s,v],"max":[h,s,v]}` re-read when it changes.
    #[arg(long)]
    tune_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut LinetraceConfig) -> Result<()> {
        if let Some(ip) = &self.tello_ip {
            cfg.vehicle.addr = vehicle_addr(ip);
        }
        if let Some(values) = &self.hsv_min {
            cfg.color.min = hsv_arg("--hsv-min", values)?;
        }
        if let Some(values) = &self.hsv_max {
            cfg.color.max = hsv_arg("--hsv-max", values)?;
        }
        if let Some(source) = &self.source {
            cfg.source.url = source.clone();
        }
        if self.manual_only {
            cfg.control.mode_policy = ModePolicy::ManualOnly;
        }
        cfg.validate()
    }
}

/// Adds the command port unless one is given; bare IPv6 addresses get brackets.
fn vehicle_addr(ip: &str) -> String {
    if ip.parse::<SocketAddr>().is_ok() {
        ip.to_string()
    } else if let Ok(addr) = ip.parse::<IpAddr>() {
        SocketAddr::new(addr, VEHICLE_COMMAND_PORT).to_string()
    } else {
        format!("{}:{}", ip, VEHICLE_COMMAND_PORT)
    }
}

fn hsv_arg(flag: &str, values: &[u8]) -> Result<Hsv> {
    let triple: [u8; 3] = values
        .try_into()
        .map_err(|_| anyhow!("{} takes exactly three values", flag))?;
    Ok(triple.into())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = LinetraceConfig::load_from(args.config.as_deref())?;
    args.apply(&mut cfg)?;
    cfg.check_flight_source(!args.dry_run, args.allow_synthetic)?;

    log::info!(
        "linetrace {} colour range {:?}..{:?} policy {:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.color.min,
        cfg.color.max,
        cfg.control.mode_policy
    );

    let range = Arc::new(SharedColorRange::new(cfg.color));
    if let Some(path) = &args.tune_file {
        spawn_range_watcher(path.clone(), Arc::clone(&range), TUNE_POLL_INTERVAL)?;
        log::info!("watching {} for colour range changes", path.display());
    }

    let mut source = open_source(&cfg.source)?;
    source.connect()?;
    let segmenter = Segmenter::new(cfg.segment, Arc::clone(&range))?;

    let mut actuator: Box<dyn Actuator> = if args.dry_run {
        Box::new(DryRunActuator::new())
    } else {
        Box::new(TelloLink::new(cfg.vehicle.clone())?)
    };
    actuator.connect()?;
    actuator.stop_video()?;
    actuator.start_video()?;
    log::info!("{} actuator ready", actuator.name());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("error setting Ctrl-C handler")?;

    let channel = UdpCommandChannel::bind(&cfg.command_addr)?;
    let mut control = ControlLoop::new(source, channel, actuator, segmenter, cfg.control.clone())
        .with_shutdown(shutdown);
    let result = control.run();

    let final_mode = control.state().mode;
    let (_, _, mut actuator) = control.into_parts();
    if final_mode == Mode::Auto {
        if let Err(e) = actuator.issue(ActuatorCommand::Stop) {
            log::warn!("failed to stop vehicle: {:#}", e);
        }
    }
    if let Err(e) = actuator.stop_video() {
        log::warn!("failed to stop video: {:#}", e);
    }

    let summary = result?;
    log::info!(
        "linetrace stopped after {} cycles, {} commands issued",
        summary.cycles,
        summary.commands_issued
    );
    Ok(())
}
