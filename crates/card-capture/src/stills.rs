//! Frame source that cycles through still images on disk. Useful for
//! replaying photographed cards without a camera.

use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{AcquisitionError, FrameStream, StreamOpener, StreamRequest};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Opens a directory (or single file) of card photos.
pub struct StillsOpener {
    path: PathBuf,
}

impl StillsOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamOpener for StillsOpener {
    fn open(&self, _request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
        let paths = list_images(&self.path)?;
        let first = load_frame(&paths[0]).map_err(|e| AcquisitionError::Failed(e.to_string()))?;

        debug!("{} still image(s) under {}", paths.len(), self.path.display());

        Ok(Box::new(StillsStream {
            label: format!("[Stills] {}", self.path.display()),
            dims: first.dimensions(),
            paths,
            next: 0,
        }))
    }
}

struct StillsStream {
    label: String,
    dims: (u32, u32),
    paths: Vec<PathBuf>,
    next: usize,
}

impl FrameStream for StillsStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        load_frame(path).map(Some)
    }
}

fn load_frame(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(img.to_rgba8())
}

fn list_images(path: &Path) -> Result<Vec<PathBuf>, AcquisitionError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let dir = std::fs::read_dir(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            AcquisitionError::PermissionDenied(path.display().to_string())
        }
        _ => AcquisitionError::NotFound(format!("{}: {}", path.display(), e)),
    })?;

    let mut paths: Vec<PathBuf> = dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(AcquisitionError::NotFound(format!(
            "no images in {}",
            path.display()
        )));
    }

    Ok(paths)
}
