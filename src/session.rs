//! Scanning session: catalog lookups, detection state and the ledger, owned
//! together so every event sees a consistent view.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use card_data::{build_indexes, matching_form, Catalog, CatalogEntry, KeywordIndex, NameIndex};
use card_match::{Lookup, MatchConfig, MatchResolver};
use card_state::{DetectionState, LedgerEntry, Phase, ScanLedger, Transition};

/// Count picker size for ordinary cards.
const MAX_COPIES: u32 = 4;
/// Count picker size for basic energies.
const MAX_BASIC_ENERGY: u32 = 30;

/// User-triggered operations. Serialized form is what the CLI reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Snapshot,
    CommitCount { count: u32 },
    CancelScan,
    CancelAll,
    SelectName { name: String },
    SelectEntry { entry_id: String },
    IncrementEntry { entry_id: String },
    DecrementEntry { entry_id: String },
    DeleteEntry { entry_id: String },
    DismissEnergyHint,
    CandidateEntries,
    CountChoices,
    SearchNames { query: String },
}

/// Everything a consumer needs to render the current scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub detection: DetectionState,
    pub ledger: Vec<LedgerEntry>,
    pub total_cards: u32,
}

pub struct Session {
    catalog: Catalog,
    keywords: KeywordIndex,
    names: NameIndex,
    resolver: MatchResolver,
    state: DetectionState,
    ledger: ScanLedger,
}

impl Session {
    pub fn new(catalog: Catalog, config: &MatchConfig) -> Result<Self> {
        let resolver = MatchResolver::new(config).context("Invalid match configuration")?;
        let (keywords, names) = build_indexes(&catalog, &config.disallowed_regulation_marks);
        info!(
            "Session ready: {} entries, {} keys, {} names",
            catalog.len(),
            keywords.len(),
            names.len()
        );

        Ok(Self {
            catalog,
            keywords,
            names,
            resolver,
            state: DetectionState::new(),
            ledger: ScanLedger::new(),
        })
    }

    /// Resume a previously scanned list.
    pub fn with_ledger(mut self, ledger: ScanLedger) -> Self {
        self.ledger = ledger;
        self
    }

    fn lookup(&self) -> Lookup<'_> {
        Lookup {
            catalog: &self.catalog,
            keywords: &self.keywords,
            names: &self.names,
        }
    }

    fn transition(&mut self, transition: Transition) -> bool {
        let before = self.state.clone();
        self.state = std::mem::take(&mut self.state).apply(transition);
        self.state != before
    }

    /// Feed one recognition result. Returns whether the detection state
    /// changed.
    pub fn on_recognized_text(&mut self, text: &str) -> bool {
        let resolution = self
            .resolver
            .resolve(text, &self.state, self.lookup(), self.ledger.last_committed());

        let mut changed = false;
        if let Some(proposal) = resolution.proposal {
            changed |= self.transition(proposal);
        }
        if resolution.energy_hint && self.state.phase == Phase::AwaitingName && !self.state.energy_hint {
            changed |= self.transition(Transition::EnergyHint);
        }
        changed
    }

    /// Add `count` copies of the resolved card to the ledger. Returns false,
    /// leaving everything as it was, when there is nothing to commit.
    pub fn commit(&mut self, count: u32) -> bool {
        if self.state.phase != Phase::Resolved {
            debug!("Commit ignored in phase {}", self.state.phase);
            return false;
        }
        let Some(entry) = self
            .state
            .resolved_entry_id
            .as_deref()
            .and_then(|id| self.catalog.get(id))
        else {
            warn!("Resolved entry {:?} is not in the catalog", self.state.resolved_entry_id);
            return false;
        };

        if !self.ledger.commit(&entry.id, &entry.name, entry.supertype, count) {
            return false;
        }
        self.transition(Transition::Committed);
        true
    }

    pub fn cancel(&mut self) {
        self.transition(Transition::Cancel);
    }

    pub fn cancel_all(&mut self) {
        self.transition(Transition::CancelAll);
    }

    pub fn dismiss_energy_hint(&mut self) {
        self.transition(Transition::DismissEnergyHint);
    }

    /// Manually pick the card name, overriding whatever was detected.
    pub fn select_name(&mut self, name: &str) -> Result<()> {
        let proposal = self
            .resolver
            .proposal_for_name(name, self.lookup())
            .with_context(|| format!("Unknown card name {}", name))?;
        self.force(proposal);
        Ok(())
    }

    /// Manually pick the exact printing.
    pub fn select_entry(&mut self, entry_id: &str) -> Result<()> {
        let entry = self
            .catalog
            .get(entry_id)
            .with_context(|| format!("Unknown catalog entry {}", entry_id))?;
        let proposal = Transition::EntryResolved {
            entry_id: entry.id.clone(),
            name: entry.base_name.clone(),
            category: entry.supertype,
        };
        self.force(proposal);
        Ok(())
    }

    /// Apply a manual override, starting over first if the current phase
    /// would reject it.
    fn force(&mut self, transition: Transition) {
        if !self.state.accepts(&transition) {
            self.transition(Transition::CancelAll);
        }
        self.transition(transition);
    }

    pub fn increment(&mut self, entry_id: &str) -> bool {
        self.ledger.increment(entry_id)
    }

    pub fn decrement(&mut self, entry_id: &str) -> bool {
        self.ledger.decrement(entry_id)
    }

    pub fn delete(&mut self, entry_id: &str) -> bool {
        self.ledger.delete(entry_id)
    }

    /// Printings of the current candidate name, for manual art selection.
    pub fn candidate_entries(&self) -> Vec<&CatalogEntry> {
        let Some(name) = self.state.candidate_name.as_deref() else {
            return Vec::new();
        };
        self.names
            .entries(name)
            .iter()
            .filter_map(|id| self.catalog.get(id))
            .collect()
    }

    /// Largest count the user can pick for the current candidate.
    pub fn count_choices(&self) -> u32 {
        match self.state.candidate_name.as_deref() {
            Some(name) if self.resolver.config().is_basic_energy(name) => MAX_BASIC_ENERGY,
            _ => MAX_COPIES,
        }
    }

    /// Indexed names containing `query`, for manual name selection.
    pub fn search_names(&self, query: &str, limit: usize) -> Vec<&str> {
        let query = matching_form(query.trim());
        self.names
            .names()
            .filter(|name| matching_form(name).contains(&query))
            .take(limit)
            .collect()
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    pub fn ledger(&self) -> &ScanLedger {
        &self.ledger
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            detection: self.state.clone(),
            ledger: self.ledger.entries().to_vec(),
            total_cards: self.ledger.total_cards(),
        }
    }

    /// Run a user command, returning its JSON result.
    pub fn execute(&mut self, command: Command) -> Result<serde_json::Value> {
        debug!(?command, "session_command");
        let value = match command {
            Command::Snapshot => serde_json::to_value(self.snapshot())?,
            Command::CommitCount { count } => {
                self.commit(count);
                serde_json::to_value(self.snapshot())?
            }
            Command::CancelScan => {
                self.cancel();
                serde_json::to_value(&self.state)?
            }
            Command::CancelAll => {
                self.cancel_all();
                serde_json::to_value(&self.state)?
            }
            Command::SelectName { name } => {
                self.select_name(&name)?;
                serde_json::to_value(&self.state)?
            }
            Command::SelectEntry { entry_id } => {
                self.select_entry(&entry_id)?;
                serde_json::to_value(&self.state)?
            }
            Command::IncrementEntry { entry_id } => serde_json::json!(self.increment(&entry_id)),
            Command::DecrementEntry { entry_id } => serde_json::json!(self.decrement(&entry_id)),
            Command::DeleteEntry { entry_id } => serde_json::json!(self.delete(&entry_id)),
            Command::DismissEnergyHint => {
                self.dismiss_energy_hint();
                serde_json::to_value(&self.state)?
            }
            Command::CandidateEntries => serde_json::to_value(self.candidate_entries())?,
            Command::CountChoices => serde_json::json!(self.count_choices()),
            Command::SearchNames { query } => serde_json::to_value(self.search_names(&query, 20))?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_data::Supertype;

    const CATALOG: &str = r#"{
        "swsh-45": {"name": "Pikachu V", "supertype": "Pokémon", "number": "045", "set_code": "SWSH", "set_printed_total": "073", "hp": "190"},
        "swsh-201": {"name": "Pikachu V", "supertype": "Pokémon", "number": "201", "set_code": "SWSH", "set_printed_total": "073", "hp": "190"},
        "sv1-181": {"name": "Nest Ball", "supertype": "Trainer", "number": "181", "set_code": "SVI", "set_printed_total": "198"},
        "sv2-185": {"name": "Iono", "supertype": "Trainer", "number": "185", "set_code": "PAL", "set_printed_total": "193"},
        "sve-2": {"name": "Basic Fire Energy", "supertype": "Energy", "number": "2", "set_code": "SVE", "set_printed_total": "8"}
    }"#;

    fn session() -> Session {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        Session::new(catalog, &MatchConfig::default()).unwrap()
    }

    #[test]
    fn test_name_then_number_then_commit() {
        let mut s = session();

        assert!(s.on_recognized_text("...Pikachu V..."));
        assert_eq!(s.state().phase, Phase::AwaitingNumber);
        assert_eq!(s.state().candidate_name.as_deref(), Some("Pikachu"));

        assert!(s.on_recognized_text("...SWSH045...045/073..."));
        assert_eq!(s.state().phase, Phase::Resolved);
        assert_eq!(s.state().resolved_entry_id.as_deref(), Some("swsh-45"));

        assert!(s.commit(2));
        assert_eq!(s.state(), &DetectionState::new());
        let entries = s.ledger().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_id, "swsh-45");
        assert_eq!(entries[0].display_name, "Pikachu V");
        assert_eq!(entries[0].count, 2);
    }

    #[test]
    fn test_trainer_rescan_is_ignored() {
        let mut s = session();
        s.on_recognized_text("Nest Ball");
        assert!(s.commit(1));

        assert!(!s.on_recognized_text("Nest Ball"));
        assert_eq!(s.state().phase, Phase::AwaitingName);

        assert!(s.on_recognized_text("Iono"));
        assert_eq!(s.state().resolved_entry_id.as_deref(), Some("sv2-185"));
    }

    #[test]
    fn test_rescan_allowed_after_delete() {
        let mut s = session();
        s.on_recognized_text("Nest Ball");
        assert!(s.commit(1));
        assert!(s.delete("sv1-181"));
        assert!(s.on_recognized_text("Nest Ball"));
    }

    #[test]
    fn test_commit_without_resolution_is_noop() {
        let mut s = session();
        assert!(!s.commit(1));
        s.on_recognized_text("Pikachu V");
        assert!(!s.commit(1));
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_zero_commit_keeps_resolution() {
        let mut s = session();
        s.on_recognized_text("Nest Ball");
        assert!(!s.commit(0));
        assert_eq!(s.state().phase, Phase::Resolved);
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_manual_overrides() {
        let mut s = session();
        s.select_name("Pikachu").unwrap();
        assert_eq!(s.state().phase, Phase::AwaitingNumber);
        assert_eq!(s.candidate_entries().len(), 2);

        s.select_entry("swsh-201").unwrap();
        assert_eq!(s.state().resolved_entry_id.as_deref(), Some("swsh-201"));

        // Overriding a resolved state starts over
        s.select_name("Iono").unwrap();
        assert_eq!(s.state().resolved_entry_id.as_deref(), Some("sv2-185"));

        assert!(s.select_name("Missingno").is_err());
        assert!(s.select_entry("nope-1").is_err());
    }

    #[test]
    fn test_cancel_steps_back() {
        let mut s = session();
        s.on_recognized_text("Pikachu V");
        s.on_recognized_text("045/073");
        s.cancel();
        assert_eq!(s.state().phase, Phase::AwaitingNumber);
        s.cancel_all();
        assert_eq!(s.state().phase, Phase::AwaitingName);
    }

    #[test]
    fn test_count_choices() {
        let mut s = session();
        assert_eq!(s.count_choices(), 4);
        s.on_recognized_text("Basic Fire Energy");
        assert_eq!(s.state().category, Some(Supertype::Energy));
        assert_eq!(s.count_choices(), 30);
    }

    #[test]
    fn test_energy_hint_from_text() {
        let mut s = session();
        assert!(s.on_recognized_text("Special energy"));
        assert!(s.state().energy_hint);
        s.dismiss_energy_hint();
        assert!(!s.state().energy_hint);
    }

    #[test]
    fn test_execute_commands() {
        let mut s = session();
        let command: Command = serde_json::from_str(r#"{"command": "select_name", "name": "Iono"}"#).unwrap();
        s.execute(command).unwrap();

        let snapshot = s.execute(Command::CommitCount { count: 3 }).unwrap();
        assert_eq!(snapshot["total_cards"], 3);
        assert_eq!(snapshot["ledger"][0]["entry_id"], "sv2-185");

        let removed = s
            .execute(Command::DecrementEntry {
                entry_id: "sv2-185".to_string(),
            })
            .unwrap();
        assert_eq!(removed, serde_json::json!(true));

        let names = s
            .execute(Command::SearchNames {
                query: "ball".to_string(),
            })
            .unwrap();
        assert_eq!(names, serde_json::json!(["Nest Ball"]));
    }
}
