// Dimension registry: canonical entities and their accepted textual variants

pub mod dimension_loader;

use std::collections::HashMap;

use crate::domain::{DimensionEntry, EntityKind};

/// Read-only registry of canonical dimension entities, loaded once per run
/// and shared across games. Entries are kept sorted by key so every lookup
/// and scan is deterministic.
#[derive(Debug, Clone, Default)]
pub struct DimensionRegistry {
    entries: HashMap<EntityKind, Vec<DimensionEntry>>,
    /// Team key -> canonical player keys, used to scope fuzzy player matching.
    rosters: HashMap<String, Vec<String>>,
}

impl DimensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, entry: DimensionEntry) {
        let entries = self.entries.entry(kind).or_default();
        entries.push(entry);
        entries.sort_by(|a, b| a.key.cmp(&b.key));
    }

    pub fn set_roster(&mut self, team_key: impl Into<String>, mut player_keys: Vec<String>) {
        player_keys.sort();
        self.rosters.insert(team_key.into(), player_keys);
    }

    pub fn entries(&self, kind: EntityKind) -> &[DimensionEntry] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roster(&self, team_key: &str) -> Option<&[String]> {
        self.rosters.get(team_key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, kind: EntityKind, key: &str) -> bool {
        self.entries(kind).iter().any(|e| e.key == key)
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.entries(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> DimensionEntry {
        DimensionEntry {
            key: key.to_string(),
            potential_values: Vec::new(),
            old_equivalents: Vec::new(),
        }
    }

    #[test]
    fn entries_stay_sorted_by_key() {
        let mut registry = DimensionRegistry::new();
        registry.insert(EntityKind::Player, entry("Webb, Dana"));
        registry.insert(EntityKind::Player, entry("Carter, Alice"));

        let keys: Vec<&str> = registry
            .entries(EntityKind::Player)
            .iter()
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(keys, vec!["Carter, Alice", "Webb, Dana"]);
    }

    #[test]
    fn unknown_kind_yields_empty_slice() {
        let registry = DimensionRegistry::new();
        assert!(registry.entries(EntityKind::Venue).is_empty());
        assert!(!registry.contains_key(EntityKind::Team, "Ice Owls"));
    }
}
