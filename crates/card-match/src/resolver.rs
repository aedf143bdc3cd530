use anyhow::Result;
use card_data::{matching_form, parse_leading_int, Catalog, CatalogEntry, KeywordIndex, NameIndex};
use card_state::{DetectionState, LedgerEntry, Phase, Transition};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::rules::{compile_edge_rules, compile_suppressions, CompiledEdgeRule, CompiledSuppression, MatchConfig};

static ENERGY_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\benergy\b").expect("energy pattern is valid"));

/// Read-only views the resolver consults on every cycle.
#[derive(Clone, Copy)]
pub struct Lookup<'a> {
    pub catalog: &'a Catalog,
    pub keywords: &'a KeywordIndex,
    pub names: &'a NameIndex,
}

/// Outcome of one recognition cycle. No proposal simply means "nothing
/// matched this time".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub proposal: Option<Transition>,
    pub energy_hint: bool,
}

/// Turns recognized text plus the current detection state into a proposed
/// transition.
pub struct MatchResolver {
    config: MatchConfig,
    edge_rules: Vec<CompiledEdgeRule>,
    suppressions: Vec<CompiledSuppression>,
}

impl MatchResolver {
    pub fn new(config: &MatchConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            edge_rules: compile_edge_rules(&config.edge_rules)?,
            suppressions: compile_suppressions(&config.suppressed_names)?,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        text: &str,
        state: &DetectionState,
        lookup: Lookup<'_>,
        last_commit: Option<&LedgerEntry>,
    ) -> Resolution {
        if text.trim().is_empty() {
            return Resolution::default();
        }

        let normalized = matching_form(text);
        match state.phase {
            Phase::AwaitingName => Resolution {
                proposal: self.resolve_name(text, &normalized, lookup, last_commit),
                energy_hint: ENERGY_WORD.is_match(&normalized),
            },
            Phase::AwaitingNumber => Resolution {
                proposal: state
                    .candidate_name
                    .as_deref()
                    .and_then(|name| self.resolve_number(name, &normalized, lookup)),
                energy_hint: false,
            },
            Phase::Resolved => Resolution::default(),
        }
    }

    /// Every selectable name the text could plausibly be showing, best first.
    /// Empty when the longest match is a card left out of the name index.
    pub fn name_candidates(&self, raw_text: &str, normalized: &str, lookup: Lookup<'_>) -> Vec<String> {
        let mut candidates: Vec<String> = lookup
            .keywords
            .implied_by(normalized)
            .map(str::to_string)
            .collect();

        for rule in &self.edge_rules {
            if rule.pattern.is_match(normalized) {
                candidates.push(rule.name.clone());
            }
        }

        for suppression in &self.suppressions {
            let before = candidates.len();
            candidates.retain(|c| !c.eq_ignore_ascii_case(&suppression.name));
            if candidates.len() != before && suppression.literal.is_match(raw_text) {
                candidates.push(suppression.name.clone());
            }
        }

        // Names the catalog has never heard of (stale rules) drop out
        candidates.retain(|c| lookup.keywords.implied_names(c).contains(c));
        candidates.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        candidates.dedup();

        // A legacy card still covers any shorter name inside it
        if let Some(longest) = candidates.first().filter(|c| !lookup.names.contains(c)) {
            debug!("Longest candidate {} is not selectable", longest);
            return Vec::new();
        }
        candidates
    }

    fn resolve_name(
        &self,
        raw_text: &str,
        normalized: &str,
        lookup: Lookup<'_>,
        last_commit: Option<&LedgerEntry>,
    ) -> Option<Transition> {
        let candidates = self.name_candidates(raw_text, normalized, lookup);
        let name = candidates.first()?;
        if candidates.len() > 1 {
            debug!("Name candidates: {:?}", candidates);
        }

        if is_repeat_scan(name, lookup, last_commit) {
            debug!("Ignoring repeat scan of {}", name);
            return None;
        }

        self.proposal_for_name(name, lookup)
    }

    /// Transition for a known card name: Pokémon wait for their collector
    /// number, everything else resolves to a representative printing.
    pub fn proposal_for_name(&self, name: &str, lookup: Lookup<'_>) -> Option<Transition> {
        let ids = lookup.names.entries(name);
        let Some(first) = ids.first().and_then(|id| lookup.catalog.get(id)) else {
            warn!("No catalog printing indexed for {}", name);
            return None;
        };

        if first.supertype.is_pokemon() {
            info!("Detected name: {}", name);
            return Some(Transition::NameDetected {
                name: name.to_string(),
                category: first.supertype,
            });
        }

        // Trainers and energies are deck-listed by name only
        let representative = self
            .config
            .basic_energy_samples
            .get(name)
            .filter(|sample| ids.contains(*sample))
            .unwrap_or(&first.id);
        info!("Detected {} {} as {}", first.supertype, name, representative);
        Some(Transition::EntryResolved {
            entry_id: representative.clone(),
            name: name.to_string(),
            category: first.supertype,
        })
    }

    fn resolve_number(&self, name: &str, normalized: &str, lookup: Lookup<'_>) -> Option<Transition> {
        let mut matches: Vec<&CatalogEntry> = Vec::new();

        for id in lookup.names.entries(name) {
            let Some(entry) = lookup.catalog.get(id) else {
                continue;
            };
            if hp_matches_number(entry) {
                debug!("Skipping {}: HP equals collector number", entry.id);
                continue;
            }
            let Some(pattern) = self.number_pattern(entry) else {
                continue;
            };
            if pattern.is_match(normalized) {
                matches.push(entry);
            }
        }

        let chosen = matches
            .iter()
            .find(|e| !e.set_code.is_empty() && normalized.contains(&matching_form(&e.set_code)))
            .or_else(|| matches.first())?;

        info!("Resolved {} as {}", name, chosen.id);
        Some(Transition::EntryResolved {
            entry_id: chosen.id.clone(),
            name: name.to_string(),
            category: chosen.supertype,
        })
    }

    /// Alphanumeric and promo numbers are distinctive on their own; plain
    /// numbers must be followed by the set's printed total on the same line.
    fn number_pattern(&self, entry: &CatalogEntry) -> Option<Regex> {
        let number = entry.number.trim();
        if number.is_empty() {
            return None;
        }

        let standalone =
            number.chars().any(|c| c.is_ascii_alphabetic()) || self.config.is_promo_set(&entry.set_code);
        let source = if standalone {
            regex::escape(number)
        } else {
            let total = entry.set_printed_total.trim();
            if total.is_empty() {
                return None;
            }
            format!("{}.*{}", regex::escape(number), regex::escape(total))
        };

        match RegexBuilder::new(&source).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Bad number pattern for {}: {}", entry.id, e);
                None
            }
        }
    }
}

/// The last commit was a non-Pokémon card with this same name.
fn is_repeat_scan(name: &str, lookup: Lookup<'_>, last_commit: Option<&LedgerEntry>) -> bool {
    let Some(last) = last_commit else {
        return false;
    };
    if last.category.is_pokemon() {
        return false;
    }
    lookup
        .catalog
        .get(&last.entry_id)
        .is_some_and(|e| e.base_name == name)
}

fn hp_matches_number(entry: &CatalogEntry) -> bool {
    let Some(hp) = entry.hp.as_deref() else {
        return false;
    };
    match (parse_leading_int(hp), parse_leading_int(&entry.number)) {
        (Some(hp), Some(number)) => hp == number,
        _ => false,
    }
}
