use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::common::error::{PipelineError, Result};
use crate::domain::{DimensionEntry, EntityKind, FactRow, GameWarehouse};
use crate::registry::DimensionRegistry;

/// Version of the exported column schema. Bump when the shape of any
/// exported table changes.
pub const SCHEMA_VERSION: &str = "v1";

/// One exported dimension table: every canonical entity of one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionTable {
    pub kind: EntityKind,
    pub rows: Vec<DimensionEntry>,
}

/// The finished warehouse in its stable, versioned export shape. Everything
/// is sorted before serialization so identical inputs serialize to identical
/// bytes, which is what full-rebuild verification compares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseExport {
    pub schema_version: String,
    pub dimensions: Vec<DimensionTable>,
    pub facts: Vec<FactRow>,
    pub games: Vec<GameWarehouse>,
}

impl WarehouseExport {
    pub fn from_tables(registry: &DimensionRegistry, games: &[GameWarehouse]) -> Self {
        let kinds = [
            EntityKind::Player,
            EntityKind::Team,
            EntityKind::Zone,
            EntityKind::Position,
            EntityKind::Venue,
        ];
        let dimensions = kinds
            .iter()
            .filter(|kind| !registry.entries(**kind).is_empty())
            .map(|kind| DimensionTable {
                kind: *kind,
                rows: registry.entries(*kind).to_vec(),
            })
            .collect();

        let mut games: Vec<GameWarehouse> = games.to_vec();
        games.sort_by(|a, b| a.game_id.cmp(&b.game_id));

        let mut facts: Vec<FactRow> = games.iter().flat_map(|g| g.facts.clone()).collect();
        facts.sort_by(|a, b| (&a.statistic, &a.keys).cmp(&(&b.statistic, &b.keys)));

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            dimensions,
            facts,
            games,
        }
    }

    /// Canonical serialized form: the bytes the storage layer receives and
    /// the bytes the snapshot digest is computed over.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Content digest of the canonical form, for byte-for-byte rebuild
    /// comparison.
    pub fn digest(&self) -> Result<String> {
        let canonical = self.to_canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }
}

/// Reads and writes the accepted snapshot digest a rebuild is compared to.
pub struct SnapshotStore;

impl SnapshotStore {
    pub fn read_digest(path: &Path) -> Result<String> {
        let digest = fs::read_to_string(path)
            .map_err(|e| PipelineError::Snapshot(format!("cannot read '{}': {}", path.display(), e)))?;
        Ok(digest.trim().to_string())
    }

    pub fn write_digest(path: &Path, digest: &str) -> Result<()> {
        fs::write(path, digest)
            .map_err(|e| PipelineError::Snapshot(format!("cannot write '{}': {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DimensionEntry;

    fn test_registry() -> DimensionRegistry {
        let mut registry = DimensionRegistry::new();
        registry.insert(
            EntityKind::Team,
            DimensionEntry {
                key: "Ice Owls".to_string(),
                potential_values: vec!["Owls".to_string()],
                old_equivalents: Vec::new(),
            },
        );
        registry
    }

    fn game(id: &str) -> GameWarehouse {
        GameWarehouse {
            game_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn identical_tables_produce_identical_digests() {
        let registry = test_registry();
        let games = vec![game("g2"), game("g1")];
        let first = WarehouseExport::from_tables(&registry, &games).digest().unwrap();
        let second = WarehouseExport::from_tables(&registry, &games).digest().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn game_order_in_input_does_not_affect_digest() {
        let registry = test_registry();
        let forward = WarehouseExport::from_tables(&registry, &[game("g1"), game("g2")]);
        let backward = WarehouseExport::from_tables(&registry, &[game("g2"), game("g1")]);
        assert_eq!(forward.digest().unwrap(), backward.digest().unwrap());
    }

    #[test]
    fn changed_tables_change_the_digest() {
        let registry = test_registry();
        let baseline = WarehouseExport::from_tables(&registry, &[game("g1")]);
        let changed = WarehouseExport::from_tables(&registry, &[game("g1"), game("g2")]);
        assert_ne!(baseline.digest().unwrap(), changed.digest().unwrap());
    }

    #[test]
    fn empty_dimension_tables_are_omitted() {
        let registry = test_registry();
        let export = WarehouseExport::from_tables(&registry, &[]);
        assert_eq!(export.dimensions.len(), 1);
        assert_eq!(export.dimensions[0].kind, EntityKind::Team);
    }

    #[test]
    fn snapshot_store_round_trips_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accepted.digest");
        SnapshotStore::write_digest(&path, "abc123").unwrap();
        assert_eq!(SnapshotStore::read_digest(&path).unwrap(), "abc123");
    }
}
