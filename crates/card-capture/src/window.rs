//! Frame source backed by a desktop window, e.g. a phone-camera mirroring
//! app or a webcam preview.

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::debug;
use xcap::Window;

use crate::{AcquisitionError, FrameStream, StreamOpener, StreamRequest};

/// Opens the first visible window whose title contains one of `titles`
/// (case-insensitive).
pub struct WindowOpener {
    titles: Vec<String>,
}

impl WindowOpener {
    pub fn new(titles: Vec<String>) -> Self {
        Self {
            titles: titles.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    fn find_window(&self) -> Result<Option<(Window, String)>, AcquisitionError> {
        let windows = Window::all().map_err(|e| classify(e.to_string()))?;

        for window in windows {
            let title = match window.title() {
                Ok(t) => t,
                Err(_) => continue,
            };
            let lower = title.to_lowercase();
            if self.titles.iter().any(|t| lower.contains(t.as_str())) {
                debug!("Found capture window: {}", title);
                return Ok(Some((window, title)));
            }
        }
        Ok(None)
    }
}

impl StreamOpener for WindowOpener {
    fn open(&self, _request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
        let (window, title) = self
            .find_window()?
            .ok_or_else(|| AcquisitionError::NotFound(format!("window matching {:?}", self.titles)))?;

        // A first capture both validates access and reports the frame size
        let probe = capture_frame(&window).map_err(|e| classify(format!("{:#}", e)))?;

        Ok(Box::new(WindowStream {
            window,
            title,
            dims: probe.dimensions(),
        }))
    }
}

struct WindowStream {
    window: Window,
    title: String,
    dims: (u32, u32),
}

impl FrameStream for WindowStream {
    fn label(&self) -> String {
        format!("[Window] {}", self.title)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        capture_frame(&self.window).map(Some)
    }
}

/// Titles of every window with a readable title, for picking a source.
pub fn list_windows() -> Result<Vec<String>, AcquisitionError> {
    let windows = Window::all().map_err(|e| classify(e.to_string()))?;
    Ok(windows
        .iter()
        .filter_map(|w| w.title().ok())
        .filter(|t| !t.trim().is_empty())
        .collect())
}

/// Capture a frame from the given window
fn capture_frame(window: &Window) -> Result<RgbaImage> {
    let img = window
        .capture_image()
        .context("Failed to capture window image")?;
    Ok(img)
}

/// Screen-recording permission failures surface as plain error strings.
fn classify(message: String) -> AcquisitionError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        AcquisitionError::PermissionDenied(message)
    } else {
        AcquisitionError::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_errors() {
        assert!(matches!(
            classify("Screen recording permission denied".to_string()),
            AcquisitionError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify("display went away".to_string()),
            AcquisitionError::Failed(_)
        ));
    }
}
