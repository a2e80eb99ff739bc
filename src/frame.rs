//! Frame and mask containers.
//!
//! - `Frame`: one colour image from the video source. Owned by the cycle that
//!   pulled it and dropped at the end of that cycle.
//! - `Region`: a rectangle of interest inside the working frame.
//! - `Mask`: binary grid produced by segmentation (0 = background, 255 = line).
//!
//! Pixels are stored as `image` buffers so a debug renderer can consume them
//! without conversion.

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, RgbImage};

/// Foreground value written into a `Mask`.
pub const MASK_ON: u8 = 255;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A 3-channel, 8-bit RGB frame at source-native resolution.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    /// Build a frame from packed RGB24 bytes, validating the buffer length.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>, sequence: u64) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self { image, sequence })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

// ----------------------------------------------------------------------------
// Region
// ----------------------------------------------------------------------------

/// Axis-aligned rectangle in working-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Fails unless the region is non-empty and lies inside a `width` x `height` image.
    pub fn check_within(&self, width: u32, height: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("region {:?} is empty", self));
        }
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        match (right, bottom) {
            (Some(r), Some(b)) if r <= width && b <= height => Ok(()),
            _ => Err(anyhow!(
                "region {:?} exceeds working frame {}x{}",
                self,
                width,
                height
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Mask
// ----------------------------------------------------------------------------

/// Binary mask. Any non-zero pixel counts as foreground.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pixels: GrayImage,
}

impl Mask {
    /// All-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
    }

    pub fn from_fn(width: u32, height: u32, mut on: impl FnMut(u32, u32) -> bool) -> Self {
        let pixels = GrayImage::from_fn(width, height, |x, y| {
            Luma([if on(x, y) { MASK_ON } else { 0 }])
        });
        Self { pixels }
    }

    pub fn from_image(pixels: GrayImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y)[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.pixels
            .put_pixel(x, y, Luma([if on { MASK_ON } else { 0 }]));
    }

    /// Fill a rectangle, clipped to the mask bounds.
    pub fn fill(&mut self, region: Region) {
        let x_end = region.x.saturating_add(region.width).min(self.width());
        let y_end = region.y.saturating_add(region.height).min(self.height());
        for y in region.y..y_end {
            for x in region.x..x_end {
                self.set(x, y, true);
            }
        }
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.pixels.as_raw().iter().filter(|&&p| p != 0).count()
    }

    /// Raw row-major bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}
