use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{frame_interval, pace, FrameSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Replays still images: one file, or every image in a directory by name.
///
/// Running past the last image is an error; there is no looping.
pub struct SequenceSource {
    path: PathBuf,
    target_fps: u32,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl SequenceSource {
    pub fn new(path: PathBuf, target_fps: u32) -> Self {
        Self {
            path,
            target_fps,
            files: Vec::new(),
            next_index: 0,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.files.len().saturating_sub(self.next_index)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn list_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("failed to read image directory {}", path.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry_path = entry?.path();
        if entry_path.is_file() && is_image(&entry_path) {
            files.push(entry_path);
        }
    }
    files.sort();
    Ok(files)
}

fn decode(path: &Path, sequence: u64) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("decode image {}", path.display()))?
        .into_rgb8();
    Ok(Frame::new(image, sequence))
}

impl FrameSource for SequenceSource {
    fn connect(&mut self) -> Result<()> {
        self.files = list_images(&self.path)?;
        if self.files.is_empty() {
            return Err(anyhow!("no png/jpg images found in {}", self.path.display()));
        }
        self.next_index = 0;
        log::info!(
            "SequenceSource: {} image(s) from {}",
            self.files.len(),
            self.path.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let Some(path) = self.files.get(self.next_index).cloned() else {
            let message = format!("image sequence {} exhausted", self.path.display());
            self.last_error = Some(message.clone());
            return Err(anyhow!(message));
        };
        pace(self.last_frame_at, frame_interval(self.target_fps));

        let frame = match decode(&path, self.frame_count) {
            Ok(frame) => frame,
            Err(e) => {
                self.last_error = Some(format!("{:#}", e));
                return Err(e);
            }
        };
        self.next_index += 1;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none() && !self.files.is_empty()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.display().to_string(),
        }
    }
}
