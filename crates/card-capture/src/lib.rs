use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub mod stills;
#[cfg(feature = "video")]
pub mod video;
pub mod window;

pub use stills::StillsOpener;
#[cfg(feature = "video")]
pub use video::VideoOpener;
pub use window::{list_windows, WindowOpener};

/// Normalized frame region (0.0-1.0 coordinates relative to the frame)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Regions sampled for recognition
pub mod regions {
    use super::ScreenRegion;

    /// Horizontal band across the middle of the frame. The user holds the
    /// line being read (card name, then set number) inside it.
    pub fn text_band() -> ScreenRegion {
        ScreenRegion {
            x: 0.1,
            y: 0.43,
            width: 0.8,
            height: 0.14,
        }
    }

    /// Whole frame, used while the user confirms a count.
    pub fn full_frame() -> ScreenRegion {
        ScreenRegion {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

/// Status of the frame source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub source_found: bool,
    pub source_label: Option<String>,
    pub fps: f64,
    pub last_capture_time: Option<u64>,
    pub resolution: Option<(u32, u32)>,
}

/// Failure to start a frame source. Terminal for a scanning session.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Frame source not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Frame source failed to start: {0}")]
    Failed(String),
}

/// Requested stream dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub width: u32,
    pub height: u32,
}

impl StreamRequest {
    pub fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
        }
    }
}

/// An opened source of frames.
pub trait FrameStream: Send {
    /// Human-readable name of the source
    fn label(&self) -> String;

    /// Frame dimensions reported by the source once opened
    fn dimensions(&self) -> (u32, u32);

    /// Block until the next frame is available. `Ok(None)` means the source
    /// has ended.
    fn next_frame(&mut self) -> Result<Option<RgbaImage>>;
}

/// Opens a frame source with the requested dimensions.
pub trait StreamOpener: Send + Sync {
    fn open(&self, request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError>;
}

/// Open a frame source. Some devices hand back a landscape stream even when
/// asked for portrait, so a landscape result is re-opened once with width and
/// height swapped. Whatever the second attempt returns is kept.
pub fn acquire(
    opener: &dyn StreamOpener,
    request: StreamRequest,
) -> Result<Box<dyn FrameStream>, AcquisitionError> {
    let stream = opener.open(request)?;
    let (w, h) = stream.dimensions();
    info!("Opened {} at {}x{}", stream.label(), w, h);

    if h < w {
        debug!("Source reported landscape {}x{}, retrying with swapped size", w, h);
        drop(stream);
        let stream = opener.open(request.swapped())?;
        let (w, h) = stream.dimensions();
        info!("Re-opened {} at {}x{}", stream.label(), w, h);
        return Ok(stream);
    }

    Ok(stream)
}

/// Crop a region from a captured frame using normalized coordinates
pub fn crop_region(frame: &RgbaImage, region: &ScreenRegion) -> RgbaImage {
    let (w, h) = (frame.width(), frame.height());
    let x = (region.x * w as f64) as u32;
    let y = (region.y * h as f64) as u32;
    let rw = (region.width * w as f64) as u32;
    let rh = (region.height * h as f64) as u32;

    // Clamp to image bounds
    let x = x.min(w.saturating_sub(1));
    let y = y.min(h.saturating_sub(1));
    let rw = rw.min(w.saturating_sub(x));
    let rh = rh.min(h.saturating_sub(y));

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}

/// Pull frames from an opened source and publish the latest one through the
/// watch channel until stopped or the source ends.
pub async fn stream_loop(
    mut stream: Box<dyn FrameStream>,
    frame_tx: watch::Sender<Option<Arc<RgbaImage>>>,
    status_tx: watch::Sender<CaptureStatus>,
    frame_interval: Duration,
    stop: Arc<AtomicBool>,
) {
    let label = stream.label();
    info!("Frame loop started for {}, interval: {:?}", label, frame_interval);

    let mut frame_count = 0u64;
    let mut fps_timer = Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("Frame loop stopping (stop signal received)");
            break;
        }

        let tick_start = Instant::now();

        // Frame sources block, so pull on a blocking thread
        let pulled = tokio::task::spawn_blocking(move || {
            let frame = stream.next_frame();
            (stream, frame)
        })
        .await;

        let frame = match pulled {
            Ok((returned, frame)) => {
                stream = returned;
                frame
            }
            Err(e) => {
                warn!("Frame task panicked: {}", e);
                break;
            }
        };

        match frame {
            Ok(Some(frame)) => {
                let resolution = (frame.width(), frame.height());
                frame_count += 1;

                let elapsed = fps_timer.elapsed().as_secs_f64();
                let fps = if elapsed > 0.0 {
                    frame_count as f64 / elapsed
                } else {
                    0.0
                };

                // Reset FPS counter every 5 seconds
                if elapsed > 5.0 {
                    frame_count = 0;
                    fps_timer = Instant::now();
                }

                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;

                let _ = status_tx.send(CaptureStatus {
                    is_capturing: true,
                    source_found: true,
                    source_label: Some(label.clone()),
                    fps,
                    last_capture_time: Some(now),
                    resolution: Some(resolution),
                });

                let _ = frame_tx.send(Some(Arc::new(frame)));
            }
            Ok(None) => {
                info!("{} ended", label);
                break;
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                let _ = status_tx.send(CaptureStatus {
                    is_capturing: false,
                    source_found: true,
                    source_label: Some(label.clone()),
                    ..CaptureStatus::default()
                });
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < frame_interval {
            tokio::time::sleep(frame_interval - elapsed).await;
        } else {
            // Yield so a slow source cannot starve the runtime
            tokio::task::yield_now().await;
        }
    }

    let _ = status_tx.send(CaptureStatus::default());
    info!("Frame loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedStream {
        dims: (u32, u32),
        remaining: u32,
    }

    impl FrameStream for FixedStream {
        fn label(&self) -> String {
            "fixed".to_string()
        }

        fn dimensions(&self) -> (u32, u32) {
            self.dims
        }

        fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RgbaImage::new(self.dims.0, self.dims.1)))
        }
    }

    /// Reports a landscape stream for every request and records what was asked.
    struct StubbornOpener {
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl StreamOpener for StubbornOpener {
        fn open(&self, request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
            self.requests.lock().unwrap().push(request);
            Ok(Box::new(FixedStream {
                dims: (640, 480),
                remaining: 1,
            }))
        }
    }

    struct DeniedOpener;

    impl StreamOpener for DeniedOpener {
        fn open(&self, _request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
            Err(AcquisitionError::PermissionDenied("camera".to_string()))
        }
    }

    #[test]
    fn test_text_band_within_frame() {
        let region = regions::text_band();
        assert!(region.x >= 0.0 && region.x + region.width <= 1.0);
        assert!(region.y >= 0.0 && region.y + region.height <= 1.0);
    }

    #[test]
    fn test_crop_region() {
        let img = RgbaImage::new(1920, 1080);
        let region = ScreenRegion {
            x: 0.5,
            y: 0.5,
            width: 0.1,
            height: 0.1,
        };
        let cropped = crop_region(&img, &region);
        assert_eq!(cropped.width(), 192);
        assert_eq!(cropped.height(), 108);
    }

    #[test]
    fn test_crop_region_clamps() {
        let img = RgbaImage::new(100, 100);
        let region = ScreenRegion {
            x: 0.9,
            y: 0.9,
            width: 0.5,
            height: 0.5,
        };
        let cropped = crop_region(&img, &region);
        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[test]
    fn test_acquire_retries_landscape_once() {
        let opener = StubbornOpener {
            requests: Mutex::new(Vec::new()),
        };
        let request = StreamRequest {
            width: 480,
            height: 640,
        };
        let stream = acquire(&opener, request).unwrap();
        assert_eq!(stream.dimensions(), (640, 480));

        let requests = opener.requests.lock().unwrap();
        assert_eq!(*requests, vec![request, request.swapped()]);
    }

    #[test]
    fn test_acquire_surfaces_denial() {
        let err = acquire(&DeniedOpener, StreamRequest::default()).err().unwrap();
        assert!(matches!(err, AcquisitionError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_stream_loop_publishes_frames_until_end() {
        let (frame_tx, frame_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());
        let stream = Box::new(FixedStream {
            dims: (8, 4),
            remaining: 3,
        });

        stream_loop(
            stream,
            frame_tx,
            status_tx,
            Duration::from_millis(1),
            Arc::new(AtomicBool::new(false)),
        )
        .await;

        let frame = frame_rx.borrow().clone().unwrap();
        assert_eq!(frame.dimensions(), (8, 4));
        // Status is reset once the source ends
        assert!(!status_rx.borrow().is_capturing);
    }
}
