use anyhow::{bail, Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Turns an image into best-effort plain text.
///
/// Implementations may be slow and are called from a blocking thread; errors
/// are never fatal to the caller.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbaImage) -> Result<String>;

    /// Whether the engine can be expected to return anything at all
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractSettings {
    pub binary: String,
    /// Page segmentation mode. 11 ("sparse text") finds text anywhere in the
    /// crop without assuming a layout.
    pub psm: u8,
    pub language: String,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            psm: 11,
            language: "eng".to_string(),
        }
    }
}

/// Reads card text using the Tesseract command-line tool.
/// Falls back gracefully when Tesseract is not installed.
pub struct TesseractRecognizer {
    settings: TesseractSettings,
    tesseract_available: bool,
    temp_dir: PathBuf,
}

impl TesseractRecognizer {
    pub fn new(settings: TesseractSettings) -> Self {
        let tesseract_available = check_tesseract(&settings.binary);
        if tesseract_available {
            debug!("Tesseract OCR available");
        } else {
            warn!(
                "Tesseract not found at '{}'. Recognition disabled; pick cards manually",
                settings.binary
            );
        }

        let temp_dir = std::env::temp_dir().join("decklist_scanner_ocr");
        let _ = std::fs::create_dir_all(&temp_dir);

        Self {
            settings,
            tesseract_available,
            temp_dir,
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &RgbaImage) -> Result<String> {
        if !self.tesseract_available {
            bail!("tesseract unavailable");
        }

        // Only one request is ever in flight, so a fixed path is enough
        let temp_path = self.temp_dir.join("ocr_input.png");
        image
            .save(&temp_path)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;

        let output = Command::new(&self.settings.binary)
            .arg(&temp_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.settings.language)
            .arg("--psm")
            .arg(self.settings.psm.to_string())
            .output()
            .context("Failed to run tesseract")?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("OCR result: '{}'", text.replace('\n', " | "));
        Ok(text)
    }

    fn is_available(&self) -> bool {
        self.tesseract_available
    }
}

/// Check if Tesseract is installed and accessible
fn check_tesseract(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_unavailable() {
        let recognizer = TesseractRecognizer::new(TesseractSettings {
            binary: "/nonexistent/tesseract".to_string(),
            ..TesseractSettings::default()
        });
        assert!(!recognizer.is_available());
        assert!(recognizer.recognize(&RgbaImage::new(4, 4)).is_err());
    }

    #[test]
    fn test_default_settings_use_sparse_text() {
        assert_eq!(TesseractSettings::default().psm, 11);
    }
}
