//! Frame sources.
//!
//! - `stub://rope` / `stub://floor`: synthetic scenes (testing, demos)
//! - local image file or directory of images, replayed in name order
//!
//! Live vehicle video is H.264 and needs an external decoder; anything that
//! can hand over RGB frames can implement `FrameSource`.
//!
//! `next_frame` is the only call in the control cycle allowed to block.

mod sequence;
mod synthetic;

pub use sequence::SequenceSource;
pub use synthetic::{Scene, SyntheticSource};

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::frame::Frame;

pub const DEFAULT_SOURCE_URL: &str = "stub://rope";
pub const DEFAULT_TARGET_FPS: u32 = 30;

#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://<scene>`, `file:///path`, or a plain local path.
    pub url: String,
    /// Pacing for sources that would otherwise run flat out. 0 disables pacing.
    pub target_fps: u32,
}

impl SourceConfig {
    /// True for `stub://` scenes, which have nothing to do with a real camera.
    pub fn is_synthetic(&self) -> bool {
        Url::parse(self.url.trim())
            .map(|url| url.scheme() == "stub")
            .unwrap_or(false)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub trait FrameSource {
    fn connect(&mut self) -> Result<()>;

    /// Next frame. Errors are fatal to the current cycle.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Build the source named by `config.url`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource + Send>> {
    if config.url.trim().is_empty() {
        return Err(anyhow!("source url is empty"));
    }
    if !config.url.contains("://") {
        return Ok(Box::new(SequenceSource::new(
            PathBuf::from(&config.url),
            config.target_fps,
        )));
    }

    let url = Url::parse(&config.url).with_context(|| format!("parse source url {}", config.url))?;
    match url.scheme() {
        "stub" => Ok(Box::new(SyntheticSource::from_url(&url, config.target_fps)?)),
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| anyhow!("file url {} has no local path", config.url))?;
            Ok(Box::new(SequenceSource::new(path, config.target_fps)))
        }
        other => Err(anyhow!(
            "unsupported source scheme '{}'; expected stub://, file:// or a local path",
            other
        )),
    }
}

pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// Sleep until `interval` has passed since `last`.
pub(crate) fn pace(last: Option<std::time::Instant>, interval: Duration) {
    if let Some(last) = last {
        let elapsed = last.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}
