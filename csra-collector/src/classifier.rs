//! Security concern classification
//!
//! A taxonomy maps concern tags to trigger phrases. The classifier compiles
//! one case-insensitive, word-bounded alternation per tag and reports every
//! tag with at least one matching phrase.

use crate::export::TAG_SEPARATOR;
use csra_common::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Taxonomy shipped with the collector
const BUILTIN_TAXONOMY: &str = include_str!("../data/security_taxonomy.toml");

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    tags: BTreeMap<String, Vec<String>>,
}

/// Tag → trigger phrases mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTaxonomy {
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl SecurityTaxonomy {
    /// Parse a taxonomy from TOML (`[tags]` table of phrase arrays)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TaxonomyFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Taxonomy parse failed: {}", e)))?;

        let mut taxonomy = Self {
            tags: BTreeMap::new(),
        };
        for (tag, phrases) in file.tags {
            for phrase in phrases {
                taxonomy.insert_phrase(&tag, &phrase)?;
            }
            if !taxonomy.tags.contains_key(tag.trim()) {
                return Err(Error::Config(format!("Taxonomy tag '{}' has no phrases", tag)));
            }
        }
        Ok(taxonomy)
    }

    /// Load a taxonomy file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read taxonomy {} failed: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// The shipped taxonomy
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TAXONOMY)
    }

    /// Built-in taxonomy, or the file at `path` when given
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    /// Add a trigger phrase, creating the tag if needed
    pub fn insert_phrase(&mut self, tag: &str, phrase: &str) -> Result<()> {
        let tag = tag.trim();
        let phrase = phrase.trim();
        if tag.is_empty() {
            return Err(Error::Config("Taxonomy tag name is empty".to_string()));
        }
        if tag.contains(TAG_SEPARATOR) {
            return Err(Error::Config(format!(
                "Taxonomy tag '{}' contains the tag separator '{}'",
                tag, TAG_SEPARATOR
            )));
        }
        if phrase.is_empty() {
            return Err(Error::Config(format!("Taxonomy tag '{}' has an empty phrase", tag)));
        }
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(phrase.to_lowercase());
        Ok(())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn phrases(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Compiled classifier; immutable once built
#[derive(Debug, Clone)]
pub struct SecurityClassifier {
    matchers: Vec<(String, Regex)>,
}

impl SecurityClassifier {
    pub fn new(taxonomy: &SecurityTaxonomy) -> Result<Self> {
        let mut matchers = Vec::with_capacity(taxonomy.len());
        for (tag, phrases) in &taxonomy.tags {
            let alternation = phrases
                .iter()
                .map(|p| phrase_pattern(p))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!("(?i)(?:{})", alternation))
                .map_err(|e| Error::Config(format!("Taxonomy tag '{}' invalid: {}", tag, e)))?;
            matchers.push((tag.clone(), regex));
        }

        debug!(tags = matchers.len(), "Security classifier compiled");
        Ok(Self { matchers })
    }

    /// Tags whose phrases occur in `text`
    pub fn classify(&self, text: &str) -> BTreeSet<String> {
        if text.trim().is_empty() {
            return BTreeSet::new();
        }
        self.matchers
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    pub fn tag_count(&self) -> usize {
        self.matchers.len()
    }
}

/// Escaped phrase where each space matches any whitespace run, anchored on
/// word boundaries at edges that are word characters
fn phrase_pattern(phrase: &str) -> String {
    let body = phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let start = if is_word(phrase.chars().next()) { r"\b" } else { "" };
    let end = if is_word(phrase.chars().last()) { r"\b" } else { "" };
    format!("{}{}{}", start, body, end)
}
