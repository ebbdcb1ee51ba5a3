use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::common::error::{PipelineError, Result};
use crate::domain::{DimensionEntry, EntityKind};
use crate::registry::DimensionRegistry;

/// On-disk shape of one dimension file: all entries for one entity kind,
/// plus optional roster scoping for player lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionFile {
    pub kind: EntityKind,
    pub entries: Vec<DimensionEntry>,
    #[serde(default)]
    pub rosters: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub team_key: String,
    pub player_keys: Vec<String>,
}

/// Load all dimension files (`*.json`) from a registry directory into one
/// read-only registry. Duplicate canonical keys within a kind are rejected.
pub fn load_from_directory<P: AsRef<Path>>(registry_dir: P) -> Result<DimensionRegistry> {
    let dir_path = registry_dir.as_ref();
    if !dir_path.exists() {
        return Err(PipelineError::Registry(format!(
            "registry directory does not exist: {}",
            dir_path.display()
        )));
    }

    let mut paths: Vec<_> = fs::read_dir(dir_path)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut registry = DimensionRegistry::new();
    let mut seen: HashSet<(EntityKind, String)> = HashSet::new();

    for path in paths {
        let content = fs::read_to_string(&path)?;
        let file: DimensionFile = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Registry(format!(
                "failed to parse dimension file {}: {}",
                path.display(),
                e
            ))
        })?;

        for entry in file.entries {
            if !seen.insert((file.kind, entry.key.clone())) {
                return Err(PipelineError::Registry(format!(
                    "duplicate {} key '{}' in {}",
                    file.kind.as_str(),
                    entry.key,
                    path.display()
                )));
            }
            registry.insert(file.kind, entry);
        }
        for roster in file.rosters {
            registry.set_roster(roster.team_key, roster.player_keys);
        }
    }

    Ok(registry)
}
