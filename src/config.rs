// src/config.rs

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings for one migration, read from an optional TOML file
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Longest gap between saves that still counts as one editing session
    pub silence_span_secs: u64,
    /// Author mapping files, applied in order
    pub author_maps: Vec<PathBuf>,
    /// Abort when any legacy identity has no mapping
    pub strict_authors: bool,
    /// Domain used to build an email for authors mapped without one
    pub email_domain: String,
    pub commit_list: PathBuf,
    pub audit_log: PathBuf,
    /// Stage each touched directory instead of individual files on replay
    pub stage_directories: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            silence_span_secs: 120,
            author_maps: Vec::new(),
            strict_authors: false,
            email_domain: "localhost".to_string(),
            commit_list: PathBuf::from("commits.txt"),
            audit_log: PathBuf::from("commits.log"),
            stage_directories: false,
        }
    }
}

impl MigrationConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn silence_span(&self) -> Duration {
        // chrono durations top out at i64::MAX milliseconds
        let secs = self.silence_span_secs.min(i64::MAX as u64 / 1_000) as i64;
        Duration::seconds(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() -> Result<()> {
        let config = MigrationConfig::load(None)?;
        assert_eq!(config, MigrationConfig::default());
        assert_eq!(config.silence_span(), Duration::seconds(120));
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("migrate.toml");
        fs::write(&path, "silence_span_secs = 600\nauthor_maps = [\"a.txt\", \"b.txt\"]\nstrict_authors = true\n")?;
        let config = MigrationConfig::load(Some(&path))?;
        assert_eq!(config.silence_span_secs, 600);
        assert_eq!(config.author_maps, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert!(config.strict_authors);
        assert_eq!(config.email_domain, "localhost");
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(MigrationConfig::load(Some(Path::new("/nonexistent/migrate.toml"))).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("migrate.toml");
        fs::write(&path, "silence_span = 5\n")?;
        assert!(MigrationConfig::load(Some(&path)).is_err());
        Ok(())
    }
}
