//! Typed progress document: catalog, tiers, items, candidates.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::naming::slugify;

/// Tier created when a document carries no grouping of its own.
pub const DEFAULT_TIER: &str = "all";

/// One discovered source record for an item, keyed by its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub extension: String,
    /// Opaque location the catalog resolves into download mirrors.
    pub locator: String,
}

/// One catalog entry needing zero-or-one successful download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Remaining candidates; removed one at a time as downloads succeed.
    #[serde(default)]
    pub candidates: BTreeMap<String, Candidate>,
    /// True once a search left (or downloads drained) the candidate map empty.
    #[serde(default)]
    pub complete: bool,
    /// Administratively excluded from searching and downloading.
    #[serde(default)]
    pub skip: bool,
    /// Fields written by other tools, kept so load-then-save is lossless.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            publisher: None,
            description: None,
            candidates: BTreeMap::new(),
            complete: false,
            skip: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Nothing left to do for this item in a run.
    pub fn is_settled(&self) -> bool {
        self.complete || self.skip
    }
}

/// Named group of item keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// The persisted record of one catalog ("bundle").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressDocument {
    pub name: String,
    /// Stable key; also names the document file and the download subdirectory.
    pub key: String,
    #[serde(default)]
    pub url: String,
    /// Tiers in catalog order (cheapest first).
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub items: BTreeMap<String, Item>,
    /// True when this document was loaded from disk rather than freshly built.
    #[serde(default)]
    pub origin_from_cache: bool,
}

impl ProgressDocument {
    pub fn new(name: impl Into<String>, key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            url: url.into(),
            tiers: Vec::new(),
            items: BTreeMap::new(),
            origin_from_cache: false,
        }
    }

    /// Builds a document from free-form `(title, author)` searches, without a source catalog.
    pub fn ad_hoc<'a, I>(searches: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let name = format!("adhoc-{}", stamp);
        let mut doc = Self::new(name.clone(), name, "");
        for (title, author) in searches {
            let key = slugify(&format!("{}_{}", title, author), 200);
            doc.insert_item(key, Item::new(title, author));
        }
        doc.ensure_default_tier();
        doc
    }

    /// Adds (or replaces) an item; new keys are appended to the last tier when tiers exist.
    pub fn insert_item(&mut self, key: impl Into<String>, item: Item) {
        let key = key.into();
        let known = self.items.insert(key.clone(), item).is_some();
        if !known {
            if let Some(tier) = self.tiers.last_mut() {
                tier.items.push(key);
            }
        }
    }

    /// Creates tier `all` listing every item, when the document has no tiers.
    pub fn ensure_default_tier(&mut self) {
        if !self.tiers.is_empty() {
            return;
        }
        self.tiers.push(Tier {
            name: DEFAULT_TIER.to_string(),
            items: self.items.keys().cloned().collect(),
        });
    }

    /// Item keys in processing order: tiers from last to first, each key once,
    /// then items no tier mentions.
    pub fn iteration_order(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::with_capacity(self.items.len());
        for tier in self.tiers.iter().rev() {
            for key in &tier.items {
                if self.items.contains_key(key) && seen.insert(key.clone()) {
                    order.push(key.clone());
                }
            }
        }
        for key in self.items.keys() {
            if seen.insert(key.clone()) {
                order.push(key.clone());
            }
        }
        order
    }

    /// Structural checks run on load.
    pub fn validate(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("document key is empty".to_string());
        }
        for tier in &self.tiers {
            if let Some(missing) = tier.items.iter().find(|k| !self.items.contains_key(*k)) {
                return Err(format!("tier {:?} references unknown item {:?}", tier.name, missing));
            }
        }
        Ok(())
    }

    /// Keys of items that are complete.
    pub fn completed_keys(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|(_, item)| item.complete)
            .map(|(k, _)| k.clone())
            .collect()
    }
}
