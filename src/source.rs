use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{PipelineError, Result};
use crate::domain::RawGameTable;

/// Boundary to the ingestion layer: something that yields row-oriented game
/// tables. Parsing spreadsheet formats happens upstream of this trait.
pub trait RawSource: Send + Sync {
    fn games(&self) -> Result<Vec<RawGameTable>>;
}

/// Source backed by already-materialized tables, used by tests and demos.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    pub tables: Vec<RawGameTable>,
}

impl InMemorySource {
    pub fn new(tables: Vec<RawGameTable>) -> Self {
        Self { tables }
    }
}

impl RawSource for InMemorySource {
    fn games(&self) -> Result<Vec<RawGameTable>> {
        Ok(self.tables.clone())
    }
}

/// Source backed by a JSON file of raw game tables, as handed over by the
/// ingestion layer.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl RawSource for JsonFileSource {
    fn games(&self) -> Result<Vec<RawGameTable>> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Config(format!(
                "failed to read games file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn json_source_round_trips_game_tables() {
        let tables = vec![RawGameTable {
            game_id: "g1".to_string(),
            events: Vec::new(),
            shifts: Vec::new(),
        }];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&tables).unwrap()).unwrap();

        let source = JsonFileSource::new(file.path());
        let loaded = source.games().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].game_id, "g1");
    }

    #[test]
    fn missing_games_file_is_an_error() {
        let source = JsonFileSource::new("/nonexistent/games.json");
        assert!(source.games().is_err());
    }
}
