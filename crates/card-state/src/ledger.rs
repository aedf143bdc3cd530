use card_data::Supertype;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One card line in the scanned deck list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub display_name: String,
    pub category: Supertype,
    pub count: u32,
    /// Order of first commit, stable across deletions
    pub insertion_index: usize,
}

/// Ordered, de-duplicated list of committed cards.
///
/// At most one entry exists per `entry_id`; counts are always positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanLedger {
    entries: Vec<LedgerEntry>,
    next_index: usize,
    /// Entry id of the most recent commit, used to ignore repeat scans
    last_committed: Option<String>,
}

impl ScanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger from `(entry_id, display_name, category, count)` rows,
    /// e.g. a previously exported list. Rows go through [`commit`](Self::commit),
    /// so duplicates merge and zero counts are dropped.
    pub fn from_entries<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Supertype, u32)>,
    {
        let mut ledger = Self::new();
        for (entry_id, display_name, category, count) in rows {
            ledger.commit(&entry_id, &display_name, category, count);
        }
        ledger.last_committed = None;
        ledger
    }

    /// Add `count` copies of a card. An existing entry has its count raised;
    /// a new one is appended. Returns false when nothing was recorded.
    pub fn commit(&mut self, entry_id: &str, display_name: &str, category: Supertype, count: u32) -> bool {
        if count == 0 {
            debug!(entry_id, "Ignoring commit with zero count");
            return false;
        }

        if let Some(existing) = self.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            existing.count = existing.count.saturating_add(count);
            info!(entry_id, count = existing.count, "ledger_merged");
        } else {
            self.entries.push(LedgerEntry {
                entry_id: entry_id.to_string(),
                display_name: display_name.to_string(),
                category,
                count,
                insertion_index: self.next_index,
            });
            self.next_index += 1;
            info!(entry_id, count, "ledger_appended");
        }

        self.last_committed = Some(entry_id.to_string());
        true
    }

    pub fn delete(&mut self, entry_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.entry_id != entry_id);
        let removed = self.entries.len() != before;
        if removed {
            if self.last_committed.as_deref() == Some(entry_id) {
                self.last_committed = None;
            }
            info!(entry_id, "ledger_deleted");
        }
        removed
    }

    pub fn increment(&mut self, entry_id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            Some(entry) => {
                entry.count = entry.count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Lower the count by one, removing the entry when it reaches zero.
    pub fn decrement(&mut self, entry_id: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.entry_id == entry_id) else {
            return false;
        };
        if entry.count > 1 {
            entry.count -= 1;
            true
        } else {
            self.delete(entry_id)
        }
    }

    pub fn get(&self, entry_id: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    /// Most recently committed entry, if it is still in the ledger.
    pub fn last_committed(&self) -> Option<&LedgerEntry> {
        self.last_committed.as_deref().and_then(|id| self.get(id))
    }

    /// Entries in first-commit order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn total_cards(&self) -> u32 {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
