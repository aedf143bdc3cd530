use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use card_capture::{CaptureStatus, StreamOpener};
use card_vision::{prepare_region, preprocess, Enhancement, PreprocessSettings, TextRecognizer};

use crate::config::ScannerConfig;
use crate::session::{Command, Session, SessionSnapshot};

/// Reply to a user command
pub type CommandReply = Result<serde_json::Value, String>;

/// Everything the session actor consumes, strictly in arrival order.
pub enum SessionEvent {
    Recognized(String),
    Command(Command, oneshot::Sender<CommandReply>),
}

/// Timing and pixel settings for the recognition loop.
#[derive(Debug, Clone)]
struct RecognitionSettings {
    preprocess: PreprocessSettings,
    sample_delay: Duration,
    dispatch_delay: Duration,
}

/// Manages the capture → preprocess → recognize → match pipeline
pub struct Pipeline {
    stop: Arc<AtomicBool>,
    events: mpsc::Sender<SessionEvent>,
    frame_rx: watch::Receiver<Option<Arc<RgbaImage>>>,
    status_rx: watch::Receiver<CaptureStatus>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    preprocess: PreprocessSettings,
}

impl Pipeline {
    /// Acquire the frame source and spawn the frame pump, the session actor
    /// and the recognition loop. Nothing is spawned if the source cannot be
    /// acquired; the `AcquisitionError` is returned instead.
    pub async fn start(
        config: &ScannerConfig,
        session: Session,
        opener: Box<dyn StreamOpener>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Result<Self> {
        let request = config.stream;
        let stream = tokio::task::spawn_blocking(move || card_capture::acquire(opener.as_ref(), request))
            .await
            .context("Frame source task failed")??;

        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = watch::channel::<Option<Arc<RgbaImage>>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(32);

        tokio::spawn(card_capture::stream_loop(
            stream,
            frame_tx,
            status_tx,
            config.frame_interval(),
            stop.clone(),
        ));

        tokio::spawn(session_actor(session, events_rx, snapshot_tx));

        let settings = RecognitionSettings {
            preprocess: config.preprocess.clone(),
            sample_delay: config.sample_delay(),
            dispatch_delay: config.dispatch_delay(),
        };
        tokio::spawn(recognition_loop(
            frame_rx.clone(),
            snapshot_rx.clone(),
            events_tx.clone(),
            recognizer,
            settings,
            stop.clone(),
        ));

        info!("Pipeline started");

        Ok(Self {
            stop,
            events: events_tx,
            frame_rx,
            status_rx,
            snapshot_rx,
            preprocess: config.preprocess.clone(),
        })
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        info!("Pipeline stop requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Run a user command on the session actor.
    pub async fn execute(&self, command: Command) -> CommandReply {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events
            .send(SessionEvent::Command(command, reply_tx))
            .await
            .map_err(|_| "Session has ended".to_string())?;
        reply_rx
            .await
            .map_err(|_| "Session dropped the command".to_string())?
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.status_rx.borrow().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that changes whenever the detection state or ledger does
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Get the latest captured frame
    pub fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        self.frame_rx.borrow().clone()
    }

    /// Save the current frame, the region being read and each enhancement
    /// variant for debugging. Returns the path to the debug directory.
    pub fn save_debug_frame(&self) -> Option<PathBuf> {
        let frame = self.latest_frame()?;
        let roi = self.snapshot().detection.region_of_interest();

        let debug_dir = std::env::temp_dir().join("decklist_scanner_debug");
        let _ = std::fs::create_dir_all(&debug_dir);
        let _ = frame.save(debug_dir.join("frame_full.png"));

        let (w, h) = (frame.width(), frame.height());
        let mut info = format!("Frame: {}x{}\n", w, h);
        info.push_str(&format!(
            "Region: x={:.0} y={:.0} w={:.0} h={:.0}\n",
            roi.x * w as f64,
            roi.y * h as f64,
            roi.width * w as f64,
            roi.height * h as f64,
        ));

        if let Some(region) = prepare_region(&frame, &roi, self.preprocess.target_width) {
            let _ = region.save(debug_dir.join("region.png"));
            for variant in Enhancement::CYCLE {
                let processed = preprocess(&region, variant, &self.preprocess);
                let name = format!("{:?}.png", variant).to_lowercase();
                let _ = processed.save(debug_dir.join(name));
            }
        } else {
            info.push_str("Region is empty\n");
        }
        let _ = std::fs::write(debug_dir.join("regions.txt"), info);

        info!("Debug frame saved to {}", debug_dir.display());
        Some(debug_dir)
    }
}

/// Owns the session. Publishes a snapshot after every event that changed it.
async fn session_actor(
    mut session: Session,
    mut events: mpsc::Receiver<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Recognized(text) => {
                if session.on_recognized_text(&text) {
                    snapshot_tx.send_replace(session.snapshot());
                }
            }
            SessionEvent::Command(command, reply) => {
                let result = session.execute(command).map_err(|e| format!("{:#}", e));
                snapshot_tx.send_if_modified(|current| {
                    let next = session.snapshot();
                    let modified = *current != next;
                    *current = next;
                    modified
                });
                let _ = reply.send(result);
            }
        }
    }
    debug!("Session actor stopped");
}

/// One recognition request in flight at a time: sample the region the
/// detection state asks for, enhance it with the next variant, recognize,
/// forward the text, repeat.
async fn recognition_loop(
    frame_rx: watch::Receiver<Option<Arc<RgbaImage>>>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    events: mpsc::Sender<SessionEvent>,
    recognizer: Arc<dyn TextRecognizer>,
    settings: RecognitionSettings,
    stop: Arc<AtomicBool>,
) {
    info!("Recognition loop started");
    let mut cycle = 0u64;

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("Recognition loop stopping (stop signal received)");
            break;
        }

        tokio::time::sleep(settings.sample_delay).await;

        let latest = frame_rx.borrow().clone();
        let Some(frame) = latest else {
            continue;
        };
        let roi = snapshot_rx.borrow().detection.region_of_interest();
        let variant = Enhancement::for_cycle(cycle);
        cycle = cycle.wrapping_add(1);

        let pixel_settings = settings.preprocess.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            prepare_region(&frame, &roi, pixel_settings.target_width)
                .map(|region| preprocess(&region, variant, &pixel_settings))
        })
        .await;

        let image = match prepared {
            Ok(Some(image)) => image,
            Ok(None) => {
                debug!("Empty region, skipping cycle");
                continue;
            }
            Err(e) => {
                warn!("Preprocess task panicked: {}", e);
                break;
            }
        };

        tokio::time::sleep(settings.dispatch_delay).await;

        let engine = recognizer.clone();
        let recognized = tokio::task::spawn_blocking(move || engine.recognize(&image)).await;

        match recognized {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                if events.send(SessionEvent::Recognized(text)).await.is_err() {
                    break;
                }
            }
            Ok(Ok(_)) => debug!("No text recognized ({:?})", variant),
            Ok(Err(e)) => debug!("Recognition failed: {:#}", e),
            Err(e) => {
                warn!("Recognition task panicked: {}", e);
                break;
            }
        }
    }

    info!("Recognition loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_capture::{AcquisitionError, FrameStream, StreamRequest};
    use card_data::Catalog;
    use card_state::Phase;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct BlankStream;

    impl FrameStream for BlankStream {
        fn label(&self) -> String {
            "[Test] blank".to_string()
        }

        fn dimensions(&self) -> (u32, u32) {
            (64, 96)
        }

        fn next_frame(&mut self) -> anyhow::Result<Option<RgbaImage>> {
            Ok(Some(RgbaImage::from_pixel(64, 96, image::Rgba([200, 200, 200, 255]))))
        }
    }

    struct BlankOpener;

    impl StreamOpener for BlankOpener {
        fn open(&self, _request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
            Ok(Box::new(BlankStream))
        }
    }

    struct DeniedOpener;

    impl StreamOpener for DeniedOpener {
        fn open(&self, _request: StreamRequest) -> Result<Box<dyn FrameStream>, AcquisitionError> {
            Err(AcquisitionError::PermissionDenied("camera".to_string()))
        }
    }

    /// Returns scripted lines in order, then nothing.
    struct ScriptedRecognizer {
        lines: Mutex<VecDeque<String>>,
    }

    impl ScriptedRecognizer {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
            }
        }
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(&self, _image: &RgbaImage) -> anyhow::Result<String> {
            let mut lines = self.lines.lock().unwrap();
            Ok(lines.pop_front().unwrap_or_default())
        }
    }

    const CATALOG: &str = r#"{
        "swsh-45": {"name": "Pikachu V", "supertype": "Pokémon", "number": "045", "set_code": "SWSH", "set_printed_total": "073"}
    }"#;

    fn fast_config() -> ScannerConfig {
        ScannerConfig {
            frame_interval_ms: 5,
            sample_delay_ms: 1,
            dispatch_delay_ms: 1,
            ..ScannerConfig::default()
        }
    }

    fn session() -> Session {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        Session::new(catalog, &Default::default()).unwrap()
    }

    async fn wait_for_phase(pipeline: &Pipeline, phase: Phase) {
        let mut rx = pipeline.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().detection.phase != phase {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_scan_to_ledger() {
        let recognizer = Arc::new(ScriptedRecognizer::new(&["...Pikachu V...", "...SWSH045...045/073..."]));
        let pipeline = Pipeline::start(&fast_config(), session(), Box::new(BlankOpener), recognizer)
            .await
            .unwrap_or_else(|e| panic!("start failed: {:#}", e));

        wait_for_phase(&pipeline, Phase::Resolved).await;
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.detection.resolved_entry_id.as_deref(), Some("swsh-45"));

        let reply = pipeline.execute(Command::CommitCount { count: 2 }).await.unwrap();
        assert_eq!(reply["ledger"][0]["entry_id"], "swsh-45");
        assert_eq!(reply["ledger"][0]["count"], 2);
        assert_eq!(pipeline.snapshot().detection.phase, Phase::AwaitingName);

        pipeline.stop();
        assert!(pipeline.is_stopped());
    }

    #[tokio::test]
    async fn test_command_errors_are_replies() {
        let recognizer = Arc::new(ScriptedRecognizer::new(&[]));
        let pipeline = Pipeline::start(&fast_config(), session(), Box::new(BlankOpener), recognizer)
            .await
            .unwrap_or_else(|e| panic!("start failed: {:#}", e));

        let reply = pipeline
            .execute(Command::SelectEntry {
                entry_id: "nope-1".to_string(),
            })
            .await;
        assert!(reply.err().is_some_and(|e| e.contains("nope-1")));

        // Nothing resolved yet, so committing changes nothing
        let reply = pipeline.execute(Command::CommitCount { count: 1 }).await.unwrap();
        assert_eq!(reply["total_cards"], 0);
        pipeline.stop();
    }

    #[tokio::test]
    async fn test_acquisition_failure_stops_start() {
        let recognizer = Arc::new(ScriptedRecognizer::new(&["Pikachu V"]));
        let result = Pipeline::start(&fast_config(), session(), Box::new(DeniedOpener), recognizer).await;
        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<AcquisitionError>(),
            Some(AcquisitionError::PermissionDenied(_))
        ));
    }
}
