//! Consumer-facing operations. Each returns JSON or a displayable error so a
//! front end can forward them verbatim.

mod capture;
mod scan;

pub use capture::*;
pub use scan::*;

use crate::pipeline::Pipeline;
use crate::session::Command;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct PipelineState(pub Mutex<Option<Pipeline>>);

async fn run_command(state: &PipelineState, command: Command) -> Result<serde_json::Value, String> {
    let pipeline = state.0.lock().await;
    match &*pipeline {
        Some(p) => p.execute(command).await,
        None => Err("Scanner is not running".to_string()),
    }
}
