//! Data-driven matching rules. Everything here is plain configuration that
//! can be overridden from the scanner's TOML file.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pattern that recognition often produces in place of a real card name.
/// Applied to the matching form of the text, case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRule {
    pub pattern: String,
    pub name: String,
}

/// A short card name that shows up inside unrelated words. It only counts
/// when `literal` appears verbatim (case-sensitive, as a whole word) in the
/// raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressedName {
    pub name: String,
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub edge_rules: Vec<EdgeRule>,
    pub suppressed_names: Vec<SuppressedName>,
    /// Set codes whose collector numbers are matched without a printed total
    pub promo_set_codes: Vec<String>,
    /// Printing used when a basic energy is resolved straight from its name
    pub basic_energy_samples: BTreeMap<String, String>,
    /// Names offered the large (1–30) count picker
    pub basic_energy_names: Vec<String>,
    /// Regulation marks no longer legal; their printings are not proposed
    pub disallowed_regulation_marks: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        let edge_rules = [
            (r"n[il1]ght\s*str[ae]?tch?er", "Night Stretcher"),
            (r"ultra\s*ba[l1i]{2}", "Ultra Ball"),
            (r"rare\s*cand[yv]", "Rare Candy"),
            (r"\b[il1]ono\b", "Iono"),
        ]
        .into_iter()
        .map(|(pattern, name)| EdgeRule {
            pattern: pattern.to_string(),
            name: name.to_string(),
        })
        .collect();

        let energies = [
            "Grass", "Fire", "Water", "Lightning", "Psychic", "Fighting", "Darkness", "Metal", "Fairy",
        ];
        let basic_energy_names: Vec<String> = energies.iter().map(|e| format!("{} Energy", e)).collect();
        // Fairy has no printing in the current energy set
        let basic_energy_samples = basic_energy_names
            .iter()
            .take(8)
            .enumerate()
            .map(|(i, name)| (name.clone(), format!("sve-{}", i + 1)))
            .collect();

        Self {
            edge_rules,
            suppressed_names: vec![SuppressedName {
                name: "Eri".to_string(),
                literal: "Eri".to_string(),
            }],
            promo_set_codes: vec!["PR".to_string(), "SVP".to_string()],
            basic_energy_samples,
            basic_energy_names,
            disallowed_regulation_marks: ["A", "B", "C", "D", "E"].iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl MatchConfig {
    pub fn is_basic_energy(&self, name: &str) -> bool {
        self.basic_energy_names.iter().any(|n| n == name)
    }

    pub fn is_promo_set(&self, set_code: &str) -> bool {
        self.promo_set_codes.iter().any(|c| c.eq_ignore_ascii_case(set_code))
    }
}

pub(crate) struct CompiledEdgeRule {
    pub pattern: Regex,
    pub name: String,
}

pub(crate) struct CompiledSuppression {
    pub name: String,
    pub literal: Regex,
}

pub(crate) fn compile_edge_rules(rules: &[EdgeRule]) -> Result<Vec<CompiledEdgeRule>> {
    rules
        .iter()
        .map(|rule| {
            let pattern = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid edge-case pattern for {}: {}", rule.name, rule.pattern))?;
            Ok(CompiledEdgeRule {
                pattern,
                name: rule.name.clone(),
            })
        })
        .collect()
}

pub(crate) fn compile_suppressions(names: &[SuppressedName]) -> Result<Vec<CompiledSuppression>> {
    names
        .iter()
        .map(|s| {
            let literal = Regex::new(&format!(r"\b{}\b", regex::escape(&s.literal)))
                .with_context(|| format!("Invalid suppression literal for {}", s.name))?;
            Ok(CompiledSuppression {
                name: s.name.clone(),
                literal,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_edge_rules_compile_and_match() {
        let rules = compile_edge_rules(&MatchConfig::default().edge_rules).unwrap();
        let hits = |text: &str| -> Vec<String> {
            rules
                .iter()
                .filter(|r| r.pattern.is_match(text))
                .map(|r| r.name.clone())
                .collect()
        };
        assert_eq!(hits("nlght stretcher"), vec!["Night Stretcher"]);
        assert_eq!(hits("ultra ba1l"), vec!["Ultra Ball"]);
        assert_eq!(hits("rare candv"), vec!["Rare Candy"]);
        assert_eq!(hits("supporter 1ono"), vec!["Iono"]);
        assert!(hits("lionon").is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let bad = [EdgeRule {
            pattern: "(unclosed".to_string(),
            name: "Broken".to_string(),
        }];
        let err = compile_edge_rules(&bad).err().unwrap();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn test_suppression_literal_is_case_sensitive_word() {
        let compiled = compile_suppressions(&MatchConfig::default().suppressed_names).unwrap();
        let eri = &compiled[0].literal;
        assert!(eri.is_match("Eri Supporter"));
        assert!(!eri.is_match("eri"));
        assert!(!eri.is_match("Erika"));
    }

    #[test]
    fn test_energy_defaults() {
        let config = MatchConfig::default();
        assert!(config.is_basic_energy("Fire Energy"));
        assert!(!config.is_basic_energy("Double Turbo Energy"));
        assert_eq!(config.basic_energy_samples.get("Fire Energy").map(String::as_str), Some("sve-2"));
        assert!(!config.basic_energy_samples.contains_key("Fairy Energy"));
        assert!(config.is_promo_set("svp"));
    }

    #[test]
    fn test_partial_toml_like_override_keeps_defaults() {
        let config: MatchConfig = serde_json::from_str(r#"{"promo_set_codes": ["PR"]}"#).unwrap();
        assert_eq!(config.promo_set_codes, vec!["PR"]);
        assert_eq!(config.suppressed_names.len(), 1);
    }
}
