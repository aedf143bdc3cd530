use super::{run_command, PipelineState};
use crate::session::Command;

/// Current detection state and ledger
pub async fn get_scan_state(state: &PipelineState) -> Result<serde_json::Value, String> {
    run_command(state, Command::Snapshot).await
}

/// Confirm the resolved card with the chosen number of copies
pub async fn commit_count(state: &PipelineState, count: u32) -> Result<serde_json::Value, String> {
    run_command(state, Command::CommitCount { count }).await
}

pub async fn cancel_scan(state: &PipelineState) -> Result<serde_json::Value, String> {
    run_command(state, Command::CancelScan).await
}

pub async fn cancel_all(state: &PipelineState) -> Result<serde_json::Value, String> {
    run_command(state, Command::CancelAll).await
}

/// Override the detected name
pub async fn select_name(state: &PipelineState, name: String) -> Result<serde_json::Value, String> {
    run_command(state, Command::SelectName { name }).await
}

/// Override the detected printing
pub async fn select_entry(state: &PipelineState, entry_id: String) -> Result<serde_json::Value, String> {
    run_command(state, Command::SelectEntry { entry_id }).await
}

pub async fn increment_entry(state: &PipelineState, entry_id: String) -> Result<serde_json::Value, String> {
    run_command(state, Command::IncrementEntry { entry_id }).await
}

pub async fn decrement_entry(state: &PipelineState, entry_id: String) -> Result<serde_json::Value, String> {
    run_command(state, Command::DecrementEntry { entry_id }).await
}

pub async fn delete_entry(state: &PipelineState, entry_id: String) -> Result<serde_json::Value, String> {
    run_command(state, Command::DeleteEntry { entry_id }).await
}

pub async fn dismiss_energy_hint(state: &PipelineState) -> Result<serde_json::Value, String> {
    run_command(state, Command::DismissEnergyHint).await
}

/// Printings of the detected name, for picking the right art
pub async fn candidate_entries(state: &PipelineState) -> Result<serde_json::Value, String> {
    run_command(state, Command::CandidateEntries).await
}

/// Largest count offered for the detected card
pub async fn count_choices(state: &PipelineState) -> Result<serde_json::Value, String> {
    run_command(state, Command::CountChoices).await
}

pub async fn search_names(state: &PipelineState, query: String) -> Result<serde_json::Value, String> {
    run_command(state, Command::SearchNames { query }).await
}
