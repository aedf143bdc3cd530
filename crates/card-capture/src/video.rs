use anyhow::Result;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{AcquisitionError, FrameStream, StreamOpener, StreamRequest};

/// Opens a video file or capture device through ffmpeg. For devices the
/// requested size is passed as the `video_size` input option.
pub struct VideoOpener {
    path: PathBuf,
}

impl VideoOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamOpener for VideoOpener {
    fn open(&self, request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
        let path = self.path.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u32), String>>();
        let (frame_tx, frame_rx) = mpsc::sync_channel::<RgbaImage>(2);

        let stop_decode = stop.clone();
        std::thread::spawn(move || {
            if let Err(e) = decode_video(&path, request, ready_tx, frame_tx, stop_decode) {
                warn!("Video decode error: {}", e);
            }
        });

        let dims = match ready_rx.recv() {
            Ok(Ok(dims)) => dims,
            Ok(Err(message)) => return Err(classify(message)),
            Err(_) => {
                return Err(AcquisitionError::Failed(
                    "decoder exited before reporting a stream".to_string(),
                ))
            }
        };

        let filename = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Box::new(VideoStream {
            label: format!("[Video] {}", filename),
            dims,
            frames: frame_rx,
            stop,
        }))
    }
}

struct VideoStream {
    label: String,
    dims: (u32, u32),
    frames: mpsc::Receiver<RgbaImage>,
    stop: Arc<AtomicBool>,
}

impl FrameStream for VideoStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        // Sender dropped means the decoder finished
        Ok(self.frames.recv().ok())
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn classify(message: String) -> AcquisitionError {
    let lower = message.to_lowercase();
    if lower.contains("permission denied") {
        AcquisitionError::PermissionDenied(message)
    } else if lower.contains("no such file") {
        AcquisitionError::NotFound(message)
    } else {
        AcquisitionError::Failed(message)
    }
}

/// Blocking video decode using ffmpeg-next.
/// Reports the stream size once, then sends decoded RGBA frames.
fn decode_video(
    path: &Path,
    request: StreamRequest,
    ready: mpsc::Sender<Result<(u32, u32), String>>,
    tx: mpsc::SyncSender<RgbaImage>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let opened = open_decoder(path, request);
    let (mut ictx, stream_index, mut decoder, mut scaler) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return Err(e);
        }
    };

    let width = decoder.width();
    let height = decoder.height();
    info!(
        "Video opened: {}x{}, format {:?}",
        width,
        height,
        decoder.format()
    );
    let _ = ready.send(Ok((width, height)));

    for (stream, packet) in ictx.packets() {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        if stream.index() != stream_index {
            continue;
        }

        decoder.send_packet(&packet)?;
        if !drain_frames(&mut decoder, &mut scaler, width, height, &tx, &stop)? {
            return Ok(());
        }
    }

    // Flush decoder
    decoder.send_eof()?;
    drain_frames(&mut decoder, &mut scaler, width, height, &tx, &stop)?;

    Ok(())
}

type Decoder = (
    ffmpeg_next::format::context::Input,
    usize,
    ffmpeg_next::decoder::Video,
    ffmpeg_next::software::scaling::Context,
);

fn open_decoder(path: &Path, request: StreamRequest) -> Result<Decoder> {
    ffmpeg_next::init()?;

    let mut options = ffmpeg_next::Dictionary::new();
    options.set("video_size", &format!("{}x{}", request.width, request.height));
    let ictx = ffmpeg_next::format::input_with_dictionary(path, options)?;

    let video_stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| anyhow::anyhow!("No video stream found"))?;

    let stream_index = video_stream.index();
    let decoder_ctx =
        ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())?;
    let decoder = decoder_ctx.decoder().video()?;

    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg_next::format::Pixel::RGBA,
        decoder.width(),
        decoder.height(),
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )?;

    Ok((ictx, stream_index, decoder, scaler))
}

/// Send every frame the decoder has ready. Returns false once the receiver
/// is gone or a stop was requested.
fn drain_frames(
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    tx: &mpsc::SyncSender<RgbaImage>,
    stop: &AtomicBool,
) -> Result<bool> {
    let mut decoded_frame = ffmpeg_next::frame::Video::empty();
    while decoder.receive_frame(&mut decoded_frame).is_ok() {
        if stop.load(Ordering::Relaxed) {
            return Ok(false);
        }

        let mut rgba_frame = ffmpeg_next::frame::Video::empty();
        scaler.run(&decoded_frame, &mut rgba_frame)?;

        let data = rgba_frame.data(0);
        let stride = rgba_frame.stride(0);

        // Copy row-by-row in case stride != width*4
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height as usize {
            let row_start = y * stride;
            let row_end = row_start + (width as usize * 4);
            pixels.extend_from_slice(&data[row_start..row_end]);
        }

        if let Some(img) = RgbaImage::from_raw(width, height, pixels) {
            if tx.send(img).is_err() {
                // Receiver dropped
                return Ok(false);
            }
        }
    }
    Ok(true)
}
