//! Import settings loaded from a YAML file.
//!
//! ```yaml
//! chunk_size: 50
//! max_concurrency: 4
//! max_rows: 5000
//! undo_chunk_size: 500
//! default_status: novo_lead
//! default_source: manual
//! ```
//!
//! Every key is optional; command-line flags override file values.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    aliases::{LeadSource, LeadStatus},
    importer::{CommitOptions, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_ROWS},
    undo::DEFAULT_DELETE_CHUNK,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    pub chunk_size: usize,
    pub max_concurrency: usize,
    pub max_rows: usize,
    pub undo_chunk_size: usize,
    pub default_status: LeadStatus,
    pub default_source: LeadSource,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_rows: DEFAULT_MAX_ROWS,
            undo_chunk_size: DEFAULT_DELETE_CHUNK,
            default_status: LeadStatus::default(),
            default_source: LeadSource::default(),
        }
    }
}

impl ImportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: ImportConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.chunk_size > 0, "chunk_size must be at least 1");
        ensure!(self.max_concurrency > 0, "max_concurrency must be at least 1");
        ensure!(self.max_rows > 0, "max_rows must be at least 1");
        ensure!(self.undo_chunk_size > 0, "undo_chunk_size must be at least 1");
        Ok(())
    }

    pub fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            chunk_size: self.chunk_size,
            max_concurrency: self.max_concurrency,
            max_rows: self.max_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.yml");
        fs::write(&path, "chunk_size: 10\ndefault_status: Ganho\n").unwrap();
        let config = ImportConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.max_rows, DEFAULT_MAX_ROWS);
        assert_eq!(config.default_status, LeadStatus::FechadoGanho);
        let options = config.commit_options();
        assert_eq!(options.chunk_size, 10);
        assert_eq!(options.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(options.max_rows, DEFAULT_MAX_ROWS);
    }

    #[test]
    fn unknown_keys_and_zero_sizes_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.yml");
        fs::write(&path, "chunk_sise: 10\n").unwrap();
        assert!(ImportConfig::load(&path).is_err());
        fs::write(&path, "max_concurrency: 0\n").unwrap();
        assert!(ImportConfig::load(&path).is_err());
    }
}
