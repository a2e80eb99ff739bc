use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::channel::DEFAULT_COMMAND_ADDR;
use crate::color::{ColorRange, Hsv};
use crate::control::{ControlSettings, NoBlobPolicy, DEFAULT_MOVE_DISTANCE_CM};
use crate::frame::Region;
use crate::ingest::{SourceConfig, DEFAULT_SOURCE_URL, DEFAULT_TARGET_FPS};
use crate::mode::ModePolicy;
use crate::segment::SegmenterConfig;
use crate::steering::SteeringLaw;
use crate::vehicle::tello::{
    TelloConfig, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_VEHICLE_ADDR, MOVE_RANGE_CM,
};

#[derive(Debug, Deserialize, Default)]
struct LinetraceConfigFile {
    vehicle: Option<VehicleConfigFile>,
    command: Option<CommandConfigFile>,
    source: Option<SourceConfigFile>,
    color: Option<ColorConfigFile>,
    segment: Option<SegmentConfigFile>,
    steering: Option<SteeringConfigFile>,
    no_blob: Option<NoBlobPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct VehicleConfigFile {
    addr: Option<String>,
    command_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CommandConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ColorConfigFile {
    hsv_min: Option<Hsv>,
    hsv_max: Option<Hsv>,
}

#[derive(Debug, Deserialize, Default)]
struct SegmentConfigFile {
    working_width: Option<u32>,
    working_height: Option<u32>,
    region: Option<Region>,
    kernel_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SteeringConfigFile {
    gain: Option<f64>,
    center_x: Option<f64>,
    dead_band: Option<f64>,
    saturation: Option<f64>,
    forward_speed: Option<i32>,
    move_distance_cm: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LinetraceConfig {
    pub vehicle: TelloConfig,
    /// Local address the operator command socket binds to.
    pub command_addr: String,
    pub source: SourceConfig,
    pub color: ColorRange,
    pub segment: SegmenterConfig,
    pub control: ControlSettings,
}

impl Default for LinetraceConfig {
    fn default() -> Self {
        Self {
            vehicle: TelloConfig::default(),
            command_addr: DEFAULT_COMMAND_ADDR.to_string(),
            source: SourceConfig::default(),
            color: ColorRange::FULL,
            segment: SegmenterConfig::default(),
            control: ControlSettings::default(),
        }
    }
}

impl LinetraceConfig {
    /// Load from the file named by `LINETRACE_CONFIG`, if any.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LINETRACE_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Defaults, then `path` (JSON, or TOML by extension), then environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LinetraceConfigFile) -> Self {
        let vehicle_file = file.vehicle.unwrap_or_default();
        let vehicle = TelloConfig {
            addr: vehicle_file
                .addr
                .unwrap_or_else(|| DEFAULT_VEHICLE_ADDR.to_string()),
            command_timeout: Duration::from_millis(
                vehicle_file
                    .command_timeout_ms
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS),
            ),
            ..TelloConfig::default()
        };
        let command_addr = file
            .command
            .and_then(|command| command.addr)
            .unwrap_or_else(|| DEFAULT_COMMAND_ADDR.to_string());

        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        let color_file = file.color.unwrap_or_default();
        let color = ColorRange {
            min: color_file.hsv_min.unwrap_or(ColorRange::FULL.min),
            max: color_file.hsv_max.unwrap_or(ColorRange::FULL.max),
        };

        let segment_file = file.segment.unwrap_or_default();
        let segment_default = SegmenterConfig::default();
        let segment = SegmenterConfig {
            working_width: segment_file
                .working_width
                .unwrap_or(segment_default.working_width),
            working_height: segment_file
                .working_height
                .unwrap_or(segment_default.working_height),
            region: segment_file.region.unwrap_or(segment_default.region),
            kernel_size: segment_file
                .kernel_size
                .unwrap_or(segment_default.kernel_size),
        };

        let steering_file = file.steering.unwrap_or_default();
        let law = SteeringLaw::default();
        let steering = SteeringLaw {
            gain: steering_file.gain.unwrap_or(law.gain),
            center_x: steering_file.center_x.unwrap_or(law.center_x),
            dead_band: steering_file.dead_band.unwrap_or(law.dead_band),
            saturation: steering_file.saturation.unwrap_or(law.saturation),
            forward_speed: steering_file.forward_speed.unwrap_or(law.forward_speed),
        };
        let control = ControlSettings {
            steering,
            move_distance_cm: steering_file
                .move_distance_cm
                .unwrap_or(DEFAULT_MOVE_DISTANCE_CM),
            mode_policy: ModePolicy::default(),
            no_blob: file.no_blob.unwrap_or_default(),
        };

        Self {
            vehicle,
            command_addr,
            source,
            color,
            segment,
            control,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("LINETRACE_VEHICLE_ADDR") {
            if !addr.trim().is_empty() {
                self.vehicle.addr = addr;
            }
        }
        if let Ok(addr) = std::env::var("LINETRACE_COMMAND_ADDR") {
            if !addr.trim().is_empty() {
                self.command_addr = addr;
            }
        }
        if let Ok(url) = std::env::var("LINETRACE_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(value) = std::env::var("LINETRACE_HSV_MIN") {
            if !value.trim().is_empty() {
                self.color.min = parse_hsv(&value)
                    .map_err(|e| anyhow!("LINETRACE_HSV_MIN: {}", e))?;
            }
        }
        if let Ok(value) = std::env::var("LINETRACE_HSV_MAX") {
            if !value.trim().is_empty() {
                self.color.max = parse_hsv(&value)
                    .map_err(|e| anyhow!("LINETRACE_HSV_MAX: {}", e))?;
            }
        }
        Ok(())
    }

    /// Check every section. Call again after applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.vehicle.addr.trim().is_empty() {
            return Err(anyhow!("vehicle address must not be empty"));
        }
        if self.command_addr.trim().is_empty() {
            return Err(anyhow!("command address must not be empty"));
        }
        if self.vehicle.command_timeout.is_zero() {
            return Err(anyhow!("vehicle command timeout must be greater than zero"));
        }
        self.color.validate()?;
        self.segment.validate()?;
        self.control.steering.validate()?;
        if !MOVE_RANGE_CM.contains(&self.control.move_distance_cm) {
            return Err(anyhow!(
                "move distance {} cm outside the vehicle range {:?}",
                self.control.move_distance_cm,
                MOVE_RANGE_CM
            ));
        }
        Ok(())
    }

    /// Refuse to fly a real vehicle on synthetic frames unless explicitly allowed.
    pub fn check_flight_source(&self, live_vehicle: bool, allow_synthetic: bool) -> Result<()> {
        if live_vehicle && !allow_synthetic && self.source.is_synthetic() {
            return Err(anyhow!(
                "source {} is synthetic but commands go to a live vehicle at {}; \
                 pass --source, --dry-run or --allow-synthetic",
                self.source.url,
                self.vehicle.addr
            ));
        }
        Ok(())
    }
}

/// Parse `h,s,v`.
pub fn parse_hsv(value: &str) -> Result<Hsv> {
    let parts = split_csv(value);
    if parts.len() != 3 {
        return Err(anyhow!("expected h,s,v, got '{}'", value));
    }
    let mut channels = [0u8; 3];
    for (slot, part) in channels.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| anyhow!("'{}' is not an integer in 0..=255", part))?;
    }
    Ok(channels.into())
}

fn read_config_file(path: &Path) -> Result<LinetraceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .collect()
}
