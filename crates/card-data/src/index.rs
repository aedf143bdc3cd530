use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::{Catalog, CatalogEntry};
use crate::names::{matching_form, parse_leading_int};

/// Maps detection keywords and card names (in matching form) to the card
/// names they imply. A keyword listed by several cards implies all of them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeywordIndex {
    keys: BTreeMap<String, Vec<String>>,
}

impl KeywordIndex {
    /// Names implied by a keyword or name, empty if not indexed.
    pub fn implied_names(&self, key: &str) -> &[String] {
        self.keys
            .get(&matching_form(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every name whose key occurs in `normalized_text`. The text must already
    /// be in matching form.
    pub fn implied_by<'a>(&'a self, normalized_text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.keys
            .iter()
            .filter(move |(key, _)| normalized_text.contains(key.as_str()))
            .flat_map(|(_, names)| names.iter().map(String::as_str))
    }

    fn add(&mut self, key: String, name: &str) {
        let names = self.keys.entry(key).or_default();
        if !names.iter().any(|n| n == name) {
            if !names.is_empty() {
                tracing::debug!("Keyword shared by {:?} and {}", names, name);
            }
            names.push(name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Maps a card name to the ids of its printings, normal printings first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NameIndex {
    names: BTreeMap<String, Vec<String>>,
}

impl NameIndex {
    pub fn entries(&self, name: &str) -> &[String] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// All indexed names, sorted. Used for manual name selection.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A printing whose collector number runs past the set's printed total.
pub fn is_secret_rare(entry: &CatalogEntry) -> bool {
    let number = parse_leading_int(&entry.number).unwrap_or(0);
    let total = parse_leading_int(&entry.set_printed_total).unwrap_or(0);
    total > 1 && number > total
}

/// Build the keyword and name lookups for a catalog.
///
/// Entries carrying a regulation mark in `disallowed_marks` are left out of
/// the name index, but their names and keywords are still indexed so that a
/// legacy card in front of the camera does not get mistaken for another name.
pub fn build_indexes(catalog: &Catalog, disallowed_marks: &[String]) -> (KeywordIndex, NameIndex) {
    let mut keyword_index = KeywordIndex::default();
    let mut name_index = NameIndex::default();

    for entry in catalog.iter() {
        for keyword in &entry.detection_keywords {
            let key = matching_form(keyword.trim());
            if key.is_empty() {
                continue;
            }
            keyword_index.add(key, &entry.base_name);
        }
    }

    // A card name only implies cards of that name, even if some other card
    // lists it as a keyword.
    let mut name_keys: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in catalog.iter() {
        let key = matching_form(&entry.base_name);
        if !key.is_empty() {
            let names = name_keys.entry(key).or_default();
            if !names.contains(&entry.base_name) {
                names.push(entry.base_name.clone());
            }
        }

        let disallowed = entry
            .regulation_mark
            .as_deref()
            .is_some_and(|mark| disallowed_marks.iter().any(|d| d.eq_ignore_ascii_case(mark)));
        if disallowed {
            continue;
        }

        name_index
            .names
            .entry(entry.base_name.clone())
            .or_default()
            .push(entry.id.clone());
    }

    keyword_index.keys.extend(name_keys);

    for ids in name_index.names.values_mut() {
        // Stable, so catalog order is kept within each group
        ids.sort_by_key(|id| catalog.get(id).is_some_and(is_secret_rare));
    }

    tracing::debug!(
        "Built indexes: {} keywords, {} names",
        keyword_index.len(),
        name_index.len()
    );

    (keyword_index, name_index)
}
