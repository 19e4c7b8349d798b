use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Entity name → ordered flattened field paths, the cached per-tenant artifact.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary(BTreeMap<String, Vec<String>>);

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previous entry for `entity_name`.
    pub fn insert(&mut self, entity_name: impl Into<String>, paths: Vec<String>) {
        self.0.insert(entity_name.into(), paths);
    }

    pub fn paths(&self, entity_name: &str) -> Option<&[String]> {
        self.0.get(entity_name).map(Vec::as_slice)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(name, paths)| (name.as_str(), paths.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn path_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Two-space indented JSON object, the form handed to the agent.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}
