use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use card_capture::{StillsOpener, StreamOpener, StreamRequest, WindowOpener};
use card_match::MatchConfig;
use card_vision::{PreprocessSettings, TesseractSettings};

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A directory of card photos, replayed in order
    Stills { path: PathBuf },
    /// A desktop window whose title contains one of `titles`
    Window { titles: Vec<String> },
    /// A video file or capture device (requires the `video` feature)
    Video { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Window {
            titles: vec!["camera".to_string(), "scrcpy".to_string()],
        }
    }
}

impl SourceConfig {
    pub fn opener(&self) -> Result<Box<dyn StreamOpener>> {
        match self {
            SourceConfig::Stills { path } => Ok(Box::new(StillsOpener::new(path))),
            SourceConfig::Window { titles } => Ok(Box::new(WindowOpener::new(titles.clone()))),
            #[cfg(feature = "video")]
            SourceConfig::Video { path } => Ok(Box::new(card_capture::VideoOpener::new(path))),
            #[cfg(not(feature = "video"))]
            SourceConfig::Video { path } => anyhow::bail!(
                "Cannot open {}: built without the `video` feature",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// `card_database.json` produced by the data fetcher
    pub catalog_path: PathBuf,
    pub source: SourceConfig,
    /// Size asked of the frame source; portrait is expected
    pub stream: StreamRequest,
    pub frame_interval_ms: u64,
    /// Pause before reading pixels for a recognition cycle
    pub sample_delay_ms: u64,
    /// Pause between preprocessing and handing the image to the recognizer
    pub dispatch_delay_ms: u64,
    pub preprocess: PreprocessSettings,
    pub tesseract: TesseractSettings,
    pub matching: MatchConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/card_database.json"),
            source: SourceConfig::default(),
            stream: StreamRequest::default(),
            frame_interval_ms: 100,
            sample_delay_ms: 100,
            dispatch_delay_ms: 100,
            preprocess: PreprocessSettings::default(),
            tesseract: TesseractSettings::default(),
            matching: MatchConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Load a TOML config. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }
}
