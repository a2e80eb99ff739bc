//! Colour space conversion and the tunable colour range.
//!
//! HSV values use the OpenCV 8-bit scale: hue in `0..=179` (degrees / 2),
//! saturation and value in `0..=255`. Hue wraparound is not handled; a range
//! is only valid when `min <= max` on every channel.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Largest hue on the 8-bit scale.
pub const HUE_MAX: u8 = 179;

/// A colour in HSV, 8-bit OpenCV scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

impl From<[u8; 3]> for Hsv {
    fn from(value: [u8; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<Hsv> for [u8; 3] {
    fn from(value: Hsv) -> Self {
        [value.h, value.s, value.v]
    }
}

/// Convert one RGB pixel to HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let r = rgb[0] as f32;
    let g = rgb[1] as f32;
    let b = rgb[2] as f32;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { delta * 255.0 / max };

    let mut h_deg = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h_deg < 0.0 {
        h_deg += 360.0;
    }
    // 359.x degrees rounds to 180, which is hue 0 again.
    let h = (h_deg / 2.0).round() as u16 % 180;

    Hsv {
        h: h as u8,
        s: s.round() as u8,
        v: max as u8,
    }
}

// ----------------------------------------------------------------------------
// ColorRange
// ----------------------------------------------------------------------------

/// Inclusive per-channel HSV bounds of the line colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub min: Hsv,
    pub max: Hsv,
}

impl ColorRange {
    /// Accepts every colour.
    pub const FULL: ColorRange = ColorRange {
        min: Hsv::new(0, 0, 0),
        max: Hsv::new(HUE_MAX, 255, 255),
    };

    pub fn new(min: Hsv, max: Hsv) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min.h > HUE_MAX || self.max.h > HUE_MAX {
            return Err(anyhow!("hue bounds must be <= {}", HUE_MAX));
        }
        if self.min.h > self.max.h || self.min.s > self.max.s || self.min.v > self.max.v {
            return Err(anyhow!(
                "colour range min {:?} exceeds max {:?} on some channel",
                self.min,
                self.max
            ));
        }
        Ok(())
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.min.h..=self.max.h).contains(&hsv.h)
            && (self.min.s..=self.max.s).contains(&hsv.s)
            && (self.min.v..=self.max.v).contains(&hsv.v)
    }
}

impl Default for ColorRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Source of the colour range in effect right now.
///
/// The segmenter asks on every cycle; implementations must not cache on its behalf.
pub trait ColorRangeProvider {
    fn current(&self) -> ColorRange;
}

impl<P: ColorRangeProvider + ?Sized> ColorRangeProvider for Arc<P> {
    fn current(&self) -> ColorRange {
        (**self).current()
    }
}

/// Fixed range, e.g. from the config file.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticColorRange(pub ColorRange);

impl ColorRangeProvider for StaticColorRange {
    fn current(&self) -> ColorRange {
        self.0
    }
}

/// Range that another thread may rewrite while the control loop runs.
///
/// Each bound is its own atomic. A reader can observe a mix of old and new
/// bounds mid-update; that is acceptable for visual tuning.
#[derive(Debug)]
pub struct SharedColorRange {
    // h_min, s_min, v_min, h_max, s_max, v_max
    bounds: [AtomicU8; 6],
}

impl SharedColorRange {
    pub fn new(initial: ColorRange) -> Self {
        let shared = Self {
            bounds: Default::default(),
        };
        shared.store(initial);
        shared
    }

    pub fn store(&self, range: ColorRange) {
        let values = [
            range.min.h,
            range.min.s,
            range.min.v,
            range.max.h,
            range.max.s,
            range.max.v,
        ];
        for (slot, value) in self.bounds.iter().zip(values) {
            slot.store(value, Ordering::Relaxed);
        }
    }
}

impl ColorRangeProvider for SharedColorRange {
    fn current(&self) -> ColorRange {
        let b: [u8; 6] = std::array::from_fn(|i| self.bounds[i].load(Ordering::Relaxed));
        ColorRange {
            min: Hsv::new(b[0], b[1], b[2]),
            max: Hsv::new(b[3], b[4], b[5]),
        }
    }
}

// ----------------------------------------------------------------------------
// File-backed live tuning
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RangeFile {
    min: [u8; 3],
    max: [u8; 3],
}

/// Read a `{ "min": [h,s,v], "max": [h,s,v] }` tuning file.
pub fn load_range_file(path: &Path) -> Result<ColorRange> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tuning file {}", path.display()))?;
    let file: RangeFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid tuning file {}", path.display()))?;
    ColorRange::new(file.min.into(), file.max.into())
}

/// Poll `path` every `interval` and push valid ranges into `shared` when the
/// file's modification time changes. The thread runs for the process lifetime.
pub fn spawn_range_watcher(
    path: PathBuf,
    shared: Arc<SharedColorRange>,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("range-watcher".to_string())
        .spawn(move || {
            let mut last_seen: Option<SystemTime> = None;
            loop {
                let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
                if modified.is_some() && modified != last_seen {
                    last_seen = modified;
                    match load_range_file(&path) {
                        Ok(range) => {
                            log::info!("colour range updated from {}: {:?}", path.display(), range);
                            shared.store(range);
                        }
                        Err(e) => log::warn!("ignoring tuning file: {:#}", e),
                    }
                }
                std::thread::sleep(interval);
            }
        })
        .context("spawn range watcher thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Instant;

    #[test]
    fn primary_colours_map_to_opencv_hues() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), Hsv::new(0, 255, 255));
        assert_eq!(rgb_to_hsv([0, 255, 0]), Hsv::new(60, 255, 255));
        assert_eq!(rgb_to_hsv([0, 0, 255]), Hsv::new(120, 255, 255));
        assert_eq!(rgb_to_hsv([255, 255, 0]), Hsv::new(30, 255, 255));
    }

    #[test]
    fn grey_has_no_hue_or_saturation() {
        assert_eq!(rgb_to_hsv([128, 128, 128]), Hsv::new(0, 0, 128));
        assert_eq!(rgb_to_hsv([0, 0, 0]), Hsv::new(0, 0, 0));
    }

    #[test]
    fn hue_near_360_wraps_to_zero() {
        // 255,0,1 sits at ~359.8 degrees.
        assert_eq!(rgb_to_hsv([255, 0, 1]).h, 0);
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(ColorRange::new(Hsv::new(10, 0, 0), Hsv::new(5, 255, 255)).is_err());
        assert!(ColorRange::new(Hsv::new(0, 0, 0), Hsv::new(180, 255, 255)).is_err());
        assert!(ColorRange::new(Hsv::new(0, 0, 0), Hsv::new(179, 255, 255)).is_ok());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = ColorRange::new(Hsv::new(10, 100, 100), Hsv::new(20, 200, 200)).unwrap();
        assert!(range.contains(Hsv::new(10, 100, 100)));
        assert!(range.contains(Hsv::new(20, 200, 200)));
        assert!(!range.contains(Hsv::new(21, 150, 150)));
        assert!(!range.contains(Hsv::new(15, 99, 150)));
    }

    #[test]
    fn shared_range_returns_latest_store() {
        let shared = SharedColorRange::new(ColorRange::FULL);
        assert_eq!(shared.current(), ColorRange::FULL);

        let narrow = ColorRange::new(Hsv::new(100, 50, 50), Hsv::new(130, 255, 255)).unwrap();
        shared.store(narrow);
        assert_eq!(shared.current(), narrow);
    }

    #[test]
    fn watcher_applies_tuning_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "min": [100, 80, 40], "max": [130, 255, 255] }"#)
            .unwrap();
        file.flush().unwrap();

        let shared = Arc::new(SharedColorRange::new(ColorRange::FULL));
        let _handle = spawn_range_watcher(
            file.path().to_path_buf(),
            shared.clone(),
            Duration::from_millis(5),
        )
        .unwrap();

        let expected = ColorRange::new(Hsv::new(100, 80, 40), Hsv::new(130, 255, 255)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while shared.current() != expected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(shared.current(), expected);
    }

    fn red_frame() -> crate::frame::Frame {
        let image = image::RgbImage::from_pixel(480, 360, image::Rgb([220, 20, 20]));
        crate::frame::Frame::new(image, 0)
    }

    #[test]
    fn half_written_range_matches_nothing() {
        use crate::segment::{Segmenter, SegmenterConfig};

        let red = ColorRange::new(Hsv::new(0, 100, 100), Hsv::new(20, 255, 255)).unwrap();
        let shared = Arc::new(SharedColorRange::new(red));
        let segmenter = Segmenter::new(SegmenterConfig::default(), shared.clone()).unwrap();
        let frame = red_frame();
        assert_eq!(segmenter.process(&frame).unwrap().mask.count(), 479 * 109);

        // New hue window 150..=170 with only h_min and the old h_max visible.
        shared.bounds[0].store(150, Ordering::Relaxed);
        shared.bounds[3].store(10, Ordering::Relaxed);
        let torn = shared.current();
        assert!(torn.min.h > torn.max.h);
        assert!(torn.validate().is_err());

        let seg = segmenter.process(&frame).unwrap();
        assert_eq!(seg.mask.count(), 0);
    }

    #[test]
    fn concurrent_stores_never_break_segmentation() {
        use crate::segment::{Segmenter, SegmenterConfig};
        use std::sync::atomic::AtomicBool;

        let red = ColorRange::new(Hsv::new(0, 100, 100), Hsv::new(20, 255, 255)).unwrap();
        let violet = ColorRange::new(Hsv::new(140, 0, 0), Hsv::new(170, 80, 90)).unwrap();
        let shared = Arc::new(SharedColorRange::new(red));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let shared = shared.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut flip = false;
                while !done.load(Ordering::Relaxed) {
                    shared.store(if flip { red } else { violet });
                    flip = !flip;
                }
            })
        };

        let segmenter = Segmenter::new(SegmenterConfig::default(), shared.clone()).unwrap();
        let frame = red_frame();
        for _ in 0..20 {
            let count = segmenter.process(&frame).unwrap().mask.count();
            // Uniform frame: every pixel matches or none does.
            assert!(count == 0 || count == 479 * 109);
        }
        done.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }

    #[test]
    fn hsv_serializes_as_triple() {
        let json = serde_json::to_string(&Hsv::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Hsv = serde_json::from_str("[4,5,6]").unwrap();
        assert_eq!(back, Hsv::new(4, 5, 6));
    }
}
