//! Connected-region labelling and dominant blob selection.
//!
//! Regions are 8-connected. Labels are assigned in raster order of each
//! region's first pixel (top-to-bottom, left-to-right), starting at 1; label 0
//! is background. The dominant blob is the region with the largest area, the
//! lowest label winning ties.

use crate::frame::Mask;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One connected region of the mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    pub label: u32,
    pub bounding_box: BoundingBox,
    /// Pixel count.
    pub area: u32,
    /// Centre of mass in mask coordinates.
    pub centroid: (f64, f64),
}

impl Blob {
    /// Centroid truncated to whole pixels.
    pub fn centroid_px(&self) -> (i32, i32) {
        (self.centroid.0 as i32, self.centroid.1 as i32)
    }
}

#[derive(Clone, Copy, Debug)]
struct Accumulator {
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    sum_x: u64,
    sum_y: u64,
}

impl Accumulator {
    fn new(x: u32, y: u32) -> Self {
        Self {
            area: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            sum_x: 0,
            sum_y: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum_x += x as u64;
        self.sum_y += y as u64;
    }

    fn into_blob(self, label: u32) -> Blob {
        let area = self.area as f64;
        Blob {
            label,
            bounding_box: BoundingBox {
                x: self.min_x,
                y: self.min_y,
                width: self.max_x - self.min_x + 1,
                height: self.max_y - self.min_y + 1,
            },
            area: self.area,
            centroid: (self.sum_x as f64 / area, self.sum_y as f64 / area),
        }
    }
}

/// Label image plus per-region statistics.
#[derive(Clone, Debug)]
pub struct Labels {
    pub width: u32,
    pub height: u32,
    /// Row-major label per pixel, 0 for background.
    pub labels: Vec<u32>,
    /// Region `i` carries label `i + 1`.
    pub regions: Vec<Blob>,
}

impl Labels {
    pub fn label_at(&self, x: u32, y: u32) -> u32 {
        self.labels[(y * self.width + x) as usize]
    }
}

/// Label every 8-connected foreground region of `mask`.
pub fn label_regions(mask: &Mask) -> Labels {
    let width = mask.width();
    let height = mask.height();
    let w = width as usize;
    let fg = mask.as_raw();

    let mut labels = vec![0u32; fg.len()];
    let mut regions = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * w + x as usize;
            if fg[idx] == 0 || labels[idx] != 0 {
                continue;
            }

            let label = regions.len() as u32 + 1;
            let mut acc = Accumulator::new(x, y);
            labels[idx] = label;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                acc.add(cx, cy);
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = cx as i64 + dx;
                        let ny = cy as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let n = ny as usize * w + nx as usize;
                        if fg[n] != 0 && labels[n] == 0 {
                            labels[n] = label;
                            stack.push((nx as u32, ny as u32));
                        }
                    }
                }
            }

            regions.push(acc.into_blob(label));
        }
    }

    Labels {
        width,
        height,
        labels,
        regions,
    }
}

/// The largest region of `mask`, or `None` when the mask is empty.
pub fn select_dominant(mask: &Mask) -> Option<Blob> {
    largest(&label_regions(mask).regions)
}

fn largest(regions: &[Blob]) -> Option<Blob> {
    let mut best: Option<Blob> = None;
    for region in regions {
        match best {
            Some(b) if region.area <= b.area => {}
            _ => best = Some(*region),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Region;

    #[test]
    fn empty_mask_has_no_blob() {
        assert!(select_dominant(&Mask::new(40, 30)).is_none());
        assert!(label_regions(&Mask::new(40, 30)).regions.is_empty());
    }

    #[test]
    fn larger_region_wins_regardless_of_scan_order() {
        // 50-pixel region first in scan order, 200-pixel region second.
        let mut mask = Mask::new(100, 60);
        mask.fill(Region::new(2, 2, 10, 5));
        mask.fill(Region::new(40, 20, 20, 10));
        let blob = select_dominant(&mask).unwrap();
        assert_eq!(blob.area, 200);
        assert_eq!(blob.centroid, (49.5, 24.5));

        // And the other way round.
        let mut mask = Mask::new(100, 60);
        mask.fill(Region::new(40, 2, 20, 10));
        mask.fill(Region::new(2, 40, 10, 5));
        let blob = select_dominant(&mask).unwrap();
        assert_eq!(blob.area, 200);
        assert_eq!(blob.centroid, (49.5, 6.5));
    }

    #[test]
    fn reports_bounding_box_area_and_centroid() {
        let mut mask = Mask::new(480, 109);
        mask.fill(Region::new(75, 25, 50, 50));
        let blob = select_dominant(&mask).unwrap();
        assert_eq!(
            blob.bounding_box,
            BoundingBox {
                x: 75,
                y: 25,
                width: 50,
                height: 50
            }
        );
        assert_eq!(blob.area, 2500);
        assert_eq!(blob.centroid, (99.5, 49.5));
        assert_eq!(blob.centroid_px(), (99, 49));
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let mut mask = Mask::new(5, 5);
        mask.set(0, 0, true);
        mask.set(1, 1, true);
        mask.set(2, 2, true);
        let labels = label_regions(&mask);
        assert_eq!(labels.regions.len(), 1);
        assert_eq!(labels.regions[0].area, 3);
    }

    #[test]
    fn ties_go_to_first_label() {
        let mut mask = Mask::new(20, 20);
        mask.fill(Region::new(10, 0, 3, 3));
        mask.fill(Region::new(0, 10, 3, 3));
        let blob = select_dominant(&mask).unwrap();
        assert_eq!(blob.label, 1);
        assert_eq!(blob.bounding_box.x, 10);
    }

    #[test]
    fn u_shape_is_one_region() {
        // Two arms joined only at the bottom row.
        let mut mask = Mask::new(10, 10);
        mask.fill(Region::new(0, 0, 1, 10));
        mask.fill(Region::new(9, 0, 1, 10));
        mask.fill(Region::new(0, 9, 10, 1));
        let labels = label_regions(&mask);
        assert_eq!(labels.regions.len(), 1);
        assert_eq!(labels.regions[0].area, 28);
        assert_eq!(labels.label_at(9, 0), 1);
        assert_eq!(labels.label_at(5, 5), 0);
    }
}
