use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::{CameraError, FrameSource};
use crate::imaging::image_codec;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays still images as if they came from a camera.
///
/// `path` is either a single image or a directory; directory entries with a
/// known image extension are played in file-name order. The sequence loops
/// unless [`once`](Self::once) is set, in which case `read` returns `None`
/// after the last image.
pub struct ImageSequenceSource {
    path: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_index: usize,
    looping: bool,
    open: bool,
}

impl ImageSequenceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: Vec::new(),
            cursor: 0,
            frame_index: 0,
            looping: true,
            open: false,
        }
    }

    pub fn once(mut self) -> Self {
        self.looping = false;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn open_error(&self, reason: impl Into<String>) -> CameraError {
        CameraError::Open {
            device: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.open {
            return Ok(());
        }
        let files = if self.path.is_dir() {
            list_images(&self.path).map_err(|e| self.open_error(e.to_string()))?
        } else if self.path.is_file() {
            vec![self.path.clone()]
        } else {
            return Err(self.open_error("no such file or directory"));
        };
        if files.is_empty() {
            return Err(CameraError::NoFrames(self.path.display().to_string()));
        }

        log::debug!(
            "Image sequence {} opened with {} image(s)",
            self.path.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Option<Frame> {
        if !self.open || self.files.is_empty() {
            return None;
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return None;
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;
        match image::open(path) {
            Ok(img) => {
                let frame = image_codec::from_rgb_image(img.to_rgb8(), self.frame_index);
                self.frame_index += 1;
                Some(frame)
            }
            Err(e) => {
                log::warn!("Skipping unreadable image {}: {e}", path.display());
                None
            }
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.files.clear();
        self.cursor = 0;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
