//! Colour segmentation.
//!
//! A frame is resized to the working resolution, cropped to the region where
//! the ground line is expected, thresholded in HSV against the current
//! `ColorRange`, and dilated with a square kernel so a fragmented rope merges
//! into one connected region.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::color::{rgb_to_hsv, ColorRange, ColorRangeProvider};
use crate::frame::{Frame, Mask, Region};

pub const DEFAULT_WORKING_WIDTH: u32 = 480;
pub const DEFAULT_WORKING_HEIGHT: u32 = 360;
/// Rows 250..359 and columns 0..479 of the working frame.
pub const DEFAULT_REGION: Region = Region::new(0, 250, 479, 109);
pub const DEFAULT_KERNEL_SIZE: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    pub working_width: u32,
    pub working_height: u32,
    pub region: Region,
    /// Side of the square dilation kernel. Must be odd.
    pub kernel_size: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            working_width: DEFAULT_WORKING_WIDTH,
            working_height: DEFAULT_WORKING_HEIGHT,
            region: DEFAULT_REGION,
            kernel_size: DEFAULT_KERNEL_SIZE,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.working_width == 0 || self.working_height == 0 {
            return Err(anyhow!("working resolution must be non-zero"));
        }
        self.region
            .check_within(self.working_width, self.working_height)?;
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(anyhow!(
                "dilation kernel size must be odd and positive, got {}",
                self.kernel_size
            ));
        }
        Ok(())
    }
}

/// Intermediate images of one segmentation pass, kept for debug rendering.
#[derive(Clone, Debug)]
pub struct Segmentation {
    /// Source frame resized to the working resolution.
    pub working: RgbImage,
    /// Crop of `working` that was thresholded.
    pub cropped: RgbImage,
    /// Dilated binary mask, same extent as `cropped`.
    pub mask: Mask,
}

/// Segment one frame with an explicit colour range.
pub fn segment(frame: &Frame, config: &SegmenterConfig, range: ColorRange) -> Result<Segmentation> {
    let working = if frame.width() == config.working_width
        && frame.height() == config.working_height
    {
        frame.image().clone()
    } else {
        imageops::resize(
            frame.image(),
            config.working_width,
            config.working_height,
            FilterType::Triangle,
        )
    };

    let region = config.region;
    region.check_within(working.width(), working.height())?;
    let cropped =
        imageops::crop_imm(&working, region.x, region.y, region.width, region.height).to_image();

    let raw = threshold(&cropped, range);
    let mask = dilate(&raw, config.kernel_size);

    Ok(Segmentation {
        working,
        cropped,
        mask,
    })
}

/// Pixels whose HSV value lies inside `range`.
pub fn threshold(image: &RgbImage, range: ColorRange) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| {
        range.contains(rgb_to_hsv(image.get_pixel(x, y).0))
    })
}

/// Binary dilation with a `kernel_size` x `kernel_size` square, anchored at
/// its centre. Pixels outside the mask never contribute.
pub fn dilate(mask: &Mask, kernel_size: u32) -> Mask {
    let radius = (kernel_size / 2) as usize;
    if radius == 0 {
        return mask.clone();
    }
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    let src = mask.as_raw();

    // The square kernel is separable: a horizontal pass then a vertical pass.
    let mut horizontal = vec![false; width * height];
    let mut prefix = vec![0u32; width.max(height) + 1];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            prefix[x + 1] = prefix[x] + u32::from(row[x] != 0);
        }
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius + 1).min(width);
            horizontal[y * width + x] = prefix[hi] > prefix[lo];
        }
    }

    let mut out = Mask::new(mask.width(), mask.height());
    for x in 0..width {
        for y in 0..height {
            prefix[y + 1] = prefix[y] + u32::from(horizontal[y * width + x]);
        }
        for y in 0..height {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius + 1).min(height);
            if prefix[hi] > prefix[lo] {
                out.set(x as u32, y as u32, true);
            }
        }
    }
    out
}

/// Segmenter bound to its configuration and a live colour range.
pub struct Segmenter<P> {
    config: SegmenterConfig,
    provider: P,
}

impl<P: ColorRangeProvider> Segmenter<P> {
    pub fn new(config: SegmenterConfig, provider: P) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segment with whatever range the provider reports at this instant.
    pub fn process(&self, frame: &Frame) -> Result<Segmentation> {
        segment(frame, &self.config, self.provider.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Hsv, SharedColorRange};
    use image::Rgb;
    use std::sync::Arc;

    const GREY: Rgb<u8> = Rgb([90, 90, 90]);
    const BLUE: Rgb<u8> = Rgb([20, 40, 220]);

    fn blue_range() -> ColorRange {
        ColorRange::new(Hsv::new(110, 100, 50), Hsv::new(130, 255, 255)).unwrap()
    }

    fn striped_frame(width: u32, height: u32, x0: u32, x1: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, _| {
            if (x0..x1).contains(&x) {
                BLUE
            } else {
                GREY
            }
        });
        Frame::new(image, 0)
    }

    #[test]
    fn dilate_grows_single_pixel_to_kernel_square() {
        let mut mask = Mask::new(31, 31);
        mask.set(15, 15, true);
        let out = dilate(&mask, 15);
        assert_eq!(out.count(), 225);
        assert!(out.get(8, 8));
        assert!(out.get(22, 22));
        assert!(!out.get(7, 15));
        assert!(!out.get(15, 23));
    }

    #[test]
    fn dilate_is_clipped_at_border() {
        let mut mask = Mask::new(20, 20);
        mask.set(0, 0, true);
        assert_eq!(dilate(&mask, 15).count(), 64);
    }

    #[test]
    fn dilate_with_unit_kernel_is_identity() {
        let mut mask = Mask::new(5, 5);
        mask.set(2, 3, true);
        assert_eq!(dilate(&mask, 1), mask);
    }

    #[test]
    fn dilate_merges_nearby_fragments() {
        let mut mask = Mask::new(40, 5);
        mask.set(5, 2, true);
        mask.set(18, 2, true);
        let out = dilate(&mask, 15);
        for x in 5..=18 {
            assert!(out.get(x, 2));
        }
    }

    #[test]
    fn segment_crops_and_thresholds_stripe() {
        let frame = striped_frame(480, 360, 100, 110);
        let seg = segment(&frame, &SegmenterConfig::default(), blue_range()).unwrap();

        assert_eq!((seg.working.width(), seg.working.height()), (480, 360));
        assert_eq!((seg.mask.width(), seg.mask.height()), (479, 109));
        // Ten stripe columns plus seven on each side after dilation.
        assert_eq!(seg.mask.count(), 24 * 109);
        assert!(seg.mask.get(93, 0));
        assert!(seg.mask.get(116, 108));
        assert!(!seg.mask.get(92, 50));
        assert!(!seg.mask.get(117, 50));
    }

    #[test]
    fn segment_resizes_to_working_resolution() {
        let frame = striped_frame(960, 720, 400, 440);
        let seg = segment(&frame, &SegmenterConfig::default(), blue_range()).unwrap();
        assert_eq!((seg.working.width(), seg.working.height()), (480, 360));
        assert_eq!((seg.mask.width(), seg.mask.height()), (479, 109));
        assert!(seg.mask.get(210, 50));
        assert!(!seg.mask.get(20, 50));
    }

    #[test]
    fn segmenter_reads_current_range_every_call() {
        let shared = Arc::new(SharedColorRange::new(blue_range()));
        let segmenter = Segmenter::new(SegmenterConfig::default(), shared.clone()).unwrap();
        let frame = striped_frame(480, 360, 100, 110);

        assert!(segmenter.process(&frame).unwrap().mask.count() > 0);

        let red_only = ColorRange::new(Hsv::new(0, 200, 200), Hsv::new(5, 255, 255)).unwrap();
        shared.store(red_only);
        assert_eq!(segmenter.process(&frame).unwrap().mask.count(), 0);
    }

    #[test]
    fn config_rejects_even_kernel_and_outside_region() {
        let mut config = SegmenterConfig::default();
        config.kernel_size = 14;
        assert!(config.validate().is_err());

        let mut config = SegmenterConfig::default();
        config.region = Region::new(0, 300, 480, 100);
        assert!(config.validate().is_err());
    }
}
