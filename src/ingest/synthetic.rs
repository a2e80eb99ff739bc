use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::time::Instant;
use url::Url;

use super::{frame_interval, pace, FrameSource, SourceStats};
use crate::frame::Frame;

/// Native resolution of the vehicle camera.
pub const SYNTHETIC_WIDTH: u32 = 960;
pub const SYNTHETIC_HEIGHT: u32 = 720;

const FLOOR: Rgb<u8> = Rgb([110, 110, 110]);
const ROPE: Rgb<u8> = Rgb([200, 30, 30]);
const ROPE_WIDTH: u32 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    /// A red rope running top to bottom, drifting sideways.
    Rope,
    /// Bare floor, nothing to follow.
    Floor,
}

/// Synthetic camera for `stub://` URLs.
///
/// `stub://rope?speed=N` moves the rope N pixels per frame, bouncing between
/// 10% and 90% of the width. The default speed is 4.
pub struct SyntheticSource {
    scene: Scene,
    speed: u32,
    target_fps: u32,
    url: String,
    frame_count: u64,
    connected: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(scene: Scene, speed: u32, target_fps: u32) -> Self {
        let name = match scene {
            Scene::Rope => "rope",
            Scene::Floor => "floor",
        };
        Self {
            scene,
            speed,
            target_fps,
            url: format!("stub://{}", name),
            frame_count: 0,
            connected: false,
            last_frame_at: None,
        }
    }

    pub fn from_url(url: &Url, target_fps: u32) -> Result<Self> {
        let scene = match url.host_str() {
            Some("rope") => Scene::Rope,
            Some("floor") => Scene::Floor,
            other => return Err(anyhow!("unknown synthetic scene {:?}", other)),
        };
        let mut speed = 4;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "speed" => {
                    speed = value
                        .parse()
                        .map_err(|_| anyhow!("stub speed must be an integer, got '{}'", value))?
                }
                other => log::warn!("ignoring unknown stub parameter '{}'", other),
            }
        }
        let mut source = Self::new(scene, speed, target_fps);
        source.url = url.to_string();
        Ok(source)
    }

    /// Left edge of the rope in frame `index` (0-based), source pixels.
    pub fn rope_x(&self, index: u64) -> u32 {
        let lo = SYNTHETIC_WIDTH / 10;
        let hi = SYNTHETIC_WIDTH * 9 / 10 - ROPE_WIDTH;
        let span = (hi - lo) as u64;
        if span == 0 || self.speed == 0 {
            return SYNTHETIC_WIDTH / 2 - ROPE_WIDTH / 2;
        }
        // Triangle wave starting at the centre.
        let start = (SYNTHETIC_WIDTH / 2 - ROPE_WIDTH / 2 - lo) as u64;
        let travel = (start + index * self.speed as u64) % (2 * span);
        let offset = if travel <= span {
            travel
        } else {
            2 * span - travel
        };
        lo + offset as u32
    }

    fn render(&self, index: u64) -> RgbImage {
        match self.scene {
            Scene::Floor => RgbImage::from_pixel(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, FLOOR),
            Scene::Rope => {
                let x0 = self.rope_x(index);
                let x1 = x0 + ROPE_WIDTH;
                RgbImage::from_fn(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, |x, _| {
                    if (x0..x1).contains(&x) {
                        ROPE
                    } else {
                        FLOOR
                    }
                })
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        pace(self.last_frame_at, frame_interval(self.target_fps));
        let image = self.render(self.frame_count);
        let frame = Frame::new(image, self.frame_count);
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}
