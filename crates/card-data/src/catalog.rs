use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::names::strip_form_affixes;

/// Top-level card category printed on every card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Supertype {
    #[serde(rename = "Pokémon", alias = "Pokemon")]
    Pokemon,
    Trainer,
    Energy,
}

impl Supertype {
    pub fn is_pokemon(self) -> bool {
        self == Supertype::Pokemon
    }
}

impl fmt::Display for Supertype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Supertype::Pokemon => write!(f, "Pokémon"),
            Supertype::Trainer => write!(f, "Trainer"),
            Supertype::Energy => write!(f, "Energy"),
        }
    }
}

/// One physical printing of a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    /// Name without alternate-form prefixes and rule-box suffixes.
    pub base_name: String,
    pub supertype: Supertype,
    pub number: String,
    pub set_code: String,
    /// Total printed on the card; secret rares number past it.
    pub set_printed_total: String,
    pub regulation_mark: Option<String>,
    pub detection_keywords: Vec<String>,
    pub hp: Option<String>,
}

/// Integers and strings are both found in fetched data for numeric fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => format!("{}", f as i64),
        }
    }
}

/// Raw card_database.json record. Most fields are optional here and
/// validated in `into_entry`.
#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    name: Option<String>,
    name_without_prefix_and_postfix: Option<String>,
    supertype: Option<Supertype>,
    number: Option<Scalar>,
    set_code: Option<String>,
    set_id: Option<String>,
    set_printed_total: Option<Scalar>,
    regulation_mark: Option<String>,
    detection_keywords: Option<Vec<String>>,
    hp: Option<Scalar>,
}

impl RawEntry {
    fn into_entry(self, key: &str) -> Result<CatalogEntry> {
        let id = self.id.unwrap_or_else(|| key.to_string());
        if id.trim().is_empty() {
            anyhow::bail!("empty id");
        }
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .context("missing name")?;
        let supertype = self.supertype.context("missing or unknown supertype")?;
        let number = self.number.context("missing number")?.into_string();
        let base_name = self
            .name_without_prefix_and_postfix
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| strip_form_affixes(&name));

        Ok(CatalogEntry {
            id,
            name,
            base_name,
            supertype,
            number,
            set_code: self.set_code.or(self.set_id).unwrap_or_default(),
            set_printed_total: self
                .set_printed_total
                .map(Scalar::into_string)
                .unwrap_or_default(),
            regulation_mark: self.regulation_mark.filter(|m| !m.is_empty()),
            detection_keywords: self.detection_keywords.unwrap_or_default(),
            hp: self.hp.map(Scalar::into_string),
        })
    }
}

/// Read-only card catalog keyed by entry id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Load the catalog from a `card_database.json` file (`{ id: entry }`).
    /// Individual malformed entries are skipped; a missing file yields an
    /// empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "No card database found at {}. Run the data fetcher first",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let catalog = Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        tracing::info!("Loaded {} catalog entries", catalog.len());
        Ok(catalog)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(content)?;
        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;

        for (key, value) in raw {
            let parsed = serde_json::from_value::<RawEntry>(value)
                .map_err(anyhow::Error::from)
                .and_then(|r| r.into_entry(&key));
            match parsed {
                Ok(entry) => {
                    entries.insert(entry.id.clone(), entry);
                }
                Err(e) => {
                    tracing::warn!("Skipping catalog entry {}: {}", key, e);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            tracing::debug!("{} catalog entries skipped", skipped);
        }

        Ok(Self { entries })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_nonexistent() {
        let catalog = Catalog::load(Path::new("/nonexistent/card_database.json")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_load_fetcher_output() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "swsh4-43": {{
                    "id": "swsh4-43", "name": "Pikachu V",
                    "name_without_prefix_and_postfix": "Pikachu",
                    "supertype": "Pokémon", "number": "43", "set_code": "VIV",
                    "set_printed_total": 185, "regulation_mark": "D",
                    "hp": "190"
                }},
                "sv1-181": {{
                    "id": "sv1-181", "name": "Nest Ball", "supertype": "Trainer",
                    "number": "181", "set_code": "SVI", "set_printed_total": 198,
                    "regulation_mark": "G"
                }}
            }}"#
        )
        .unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);

        let pikachu = catalog.get("swsh4-43").unwrap();
        assert_eq!(pikachu.base_name, "Pikachu");
        assert_eq!(pikachu.supertype, Supertype::Pokemon);
        assert_eq!(pikachu.set_printed_total, "185");
        assert_eq!(pikachu.hp.as_deref(), Some("190"));

        let nest_ball = catalog.get("sv1-181").unwrap();
        assert_eq!(nest_ball.base_name, "Nest Ball");
        assert!(nest_ball.detection_keywords.is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let catalog = Catalog::from_json(
            r#"{
                "ok-1": {"id": "ok-1", "name": "Iono", "supertype": "Trainer", "number": "185"},
                "bad-1": {"id": "bad-1", "supertype": "Trainer", "number": "1"},
                "bad-2": {"id": "bad-2", "name": "Mystery", "supertype": "Item", "number": "2"},
                "bad-3": "not an object"
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("ok-1").is_some());
    }

    #[test]
    fn test_base_name_derived_when_missing() {
        let catalog = Catalog::from_json(
            r#"{"sv3-1": {"name": "Basic Fire Energy", "supertype": "Energy", "number": "2"}}"#,
        )
        .unwrap();
        let entry = catalog.get("sv3-1").unwrap();
        assert_eq!(entry.base_name, "Fire Energy");
        assert_eq!(entry.id, "sv3-1");
    }
}
