use std::path::Path;
use std::sync::Arc;

use card_data::{Catalog, Supertype};
use card_state::{LedgerEntry, ScanLedger};
use card_vision::{TesseractRecognizer, TextRecognizer};

use super::PipelineState;
use crate::config::ScannerConfig;
use crate::pipeline::Pipeline;
use crate::session::Session;

/// Load the catalog, acquire the frame source and start scanning. A running
/// scanner is left alone.
pub async fn start_scanning(
    pipeline_state: &PipelineState,
    config: &ScannerConfig,
    resume: Option<&Path>,
) -> Result<(), String> {
    let mut pipeline = pipeline_state.0.lock().await;
    if pipeline.as_ref().is_some_and(|p| !p.is_stopped()) {
        return Ok(());
    }

    let catalog = Catalog::load(&config.catalog_path).map_err(|e| format!("{:#}", e))?;
    let mut session = Session::new(catalog, &config.matching).map_err(|e| format!("{:#}", e))?;
    if let Some(path) = resume {
        session = session.with_ledger(load_ledger(path)?);
    }

    let opener = config.source.opener().map_err(|e| format!("{:#}", e))?;
    let recognizer: Arc<dyn TextRecognizer> = Arc::new(TesseractRecognizer::new(config.tesseract.clone()));

    tracing::info!("Catalog: {}", config.catalog_path.display());
    let p = Pipeline::start(config, session, opener, recognizer)
        .await
        .map_err(|e| format!("{:#}", e))?;
    *pipeline = Some(p);

    Ok(())
}

pub async fn stop_scanning(pipeline_state: &PipelineState) -> Result<(), String> {
    let pipeline = pipeline_state.0.lock().await;
    if let Some(ref p) = *pipeline {
        p.stop();
    }
    Ok(())
}

pub async fn get_capture_status(pipeline_state: &PipelineState) -> Result<serde_json::Value, String> {
    let pipeline = pipeline_state.0.lock().await;
    match &*pipeline {
        Some(p) => serde_json::to_value(p.capture_status()).map_err(|e| e.to_string()),
        None => Ok(serde_json::json!({
            "is_capturing": false,
            "source_found": false,
            "source_label": null,
            "fps": 0.0,
            "last_capture_time": null,
            "resolution": null,
        })),
    }
}

/// List all visible windows on the system, for choosing a window source
pub fn list_windows() -> Result<serde_json::Value, String> {
    let titles = card_capture::list_windows().map_err(|e| e.to_string())?;
    Ok(serde_json::json!(titles))
}

/// Save the current frame and region crops for debugging.
/// Returns the path to the debug directory.
pub async fn save_debug_frame(pipeline_state: &PipelineState) -> Result<Option<String>, String> {
    let pipeline = pipeline_state.0.lock().await;
    match &*pipeline {
        Some(p) => Ok(p.save_debug_frame().map(|p| p.to_string_lossy().to_string())),
        None => Ok(None),
    }
}

/// Read a ledger saved from a snapshot's `ledger` field.
fn load_ledger(path: &Path) -> Result<ScanLedger, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse_ledger(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

fn parse_ledger(content: &str) -> Result<ScanLedger, serde_json::Error> {
    let rows: Vec<LedgerEntry> = serde_json::from_str(content)?;
    let mut rows: Vec<(usize, (String, String, Supertype, u32))> = rows
        .into_iter()
        .map(|e| (e.insertion_index, (e.entry_id, e.display_name, e.category, e.count)))
        .collect();
    rows.sort_by_key(|(index, _)| *index);
    Ok(ScanLedger::from_entries(rows.into_iter().map(|(_, row)| row)))
}
