// src/source.rs

//! Revision and label sources
//!
//! The reconstruction only needs already-materialized metadata. A source
//! hands it over per file; individual versions may be unreadable, and those
//! come back as a classified [`RevisionError`] instead of failing the file.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Why a single file version could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ContentNotRetained,
    Corrupted,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContentNotRetained => "content not retained",
            Self::Corrupted => "corrupted revision",
            Self::Unknown => "unknown failure",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file}@{version}: {kind}")]
pub struct RevisionError {
    pub file: String,
    pub version: u32,
    pub kind: FailureKind,
}

/// Revision metadata before identities are interned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRevision {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLabel {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-file revision history of the legacy store
pub trait RevisionSource: Sync {
    fn file_specs(&self) -> Vec<String>;

    /// Revisions of one file in version order
    fn history(&self, file_spec: &str) -> Vec<Result<RawRevision, RevisionError>>;
}

/// Repository-wide label history
pub trait LabelSource {
    fn labels(&self) -> Vec<RawLabel>;
}

#[derive(Debug, Deserialize)]
struct DumpRevision {
    version: u32,
    timestamp: Option<DateTime<Utc>>,
    author: Option<String>,
    #[serde(default)]
    comment: String,
    error: Option<FailureKind>,
}

#[derive(Debug, Deserialize)]
struct DumpFile {
    path: String,
    #[serde(default)]
    revisions: Vec<DumpRevision>,
}

/// An exported JSON snapshot of the legacy store's metadata
#[derive(Debug, Deserialize)]
pub struct JsonDump {
    #[serde(default)]
    files: Vec<DumpFile>,
    #[serde(default)]
    labels: Vec<RawLabel>,
}

impl JsonDump {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dump: Self = serde_json::from_str(&text).map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Loaded dump {} with {} files, {} labels",
            path.display(),
            dump.files.len(),
            dump.labels.len()
        );
        Ok(dump)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl RevisionSource for JsonDump {
    fn file_specs(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    fn history(&self, file_spec: &str) -> Vec<Result<RawRevision, RevisionError>> {
        let Some(file) = self.files.iter().find(|f| f.path == file_spec) else {
            return Vec::new();
        };
        let mut revisions: Vec<_> = file
            .revisions
            .iter()
            .map(|rev| {
                let fail = |kind| RevisionError {
                    file: file.path.clone(),
                    version: rev.version,
                    kind,
                };
                if let Some(kind) = rev.error {
                    return Err(fail(kind));
                }
                match (rev.timestamp, &rev.author) {
                    (Some(timestamp), Some(author)) => Ok(RawRevision {
                        version: rev.version,
                        timestamp,
                        author: author.clone(),
                        comment: rev.comment.clone(),
                    }),
                    _ => Err(fail(FailureKind::Corrupted)),
                }
            })
            .collect();
        revisions.sort_by_key(|r| match r {
            Ok(rev) => rev.version,
            Err(err) => err.version,
        });
        revisions
    }
}

impl LabelSource for JsonDump {
    fn labels(&self) -> Vec<RawLabel> {
        self.labels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;

    const DUMP: &str = r#"{
        "files": [
            { "path": "$/proj/a.c", "revisions": [
                { "version": 2, "timestamp": "2001-01-01T00:01:00Z", "author": "bob" },
                { "version": 1, "timestamp": "2001-01-01T00:00:00Z", "author": "bob", "comment": "add" },
                { "version": 3, "error": "content_not_retained" },
                { "version": 4, "author": "bob" }
            ]},
            { "path": "$/proj/b.c" }
        ],
        "labels": [ { "text": "V1", "timestamp": "2001-01-02T00:00:00Z" } ]
    }"#;

    #[test]
    fn test_history_in_version_order_with_failures() -> Result<()> {
        let dump = JsonDump::parse(DUMP)?;
        assert_eq!(dump.file_specs(), vec!["$/proj/a.c", "$/proj/b.c"]);

        let history = dump.history("$/proj/a.c");
        assert_eq!(history.len(), 4);
        let first = history[0].as_ref().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.comment, "add");
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(history[1].as_ref().unwrap().comment, "");
        assert_eq!(history[2].as_ref().unwrap_err().kind, FailureKind::ContentNotRetained);
        assert_eq!(history[3].as_ref().unwrap_err().kind, FailureKind::Corrupted);
        assert!(dump.history("$/proj/b.c").is_empty());
        assert!(dump.history("$/missing").is_empty());
        Ok(())
    }

    #[test]
    fn test_labels() -> Result<()> {
        let dump = JsonDump::parse(DUMP)?;
        let labels = dump.labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].text, "V1");
        Ok(())
    }

    #[test]
    fn test_failure_message_names_version() {
        let err = RevisionError {
            file: "$/a".to_string(),
            version: 9,
            kind: FailureKind::Corrupted,
        };
        assert_eq!(err.to_string(), "$/a@9: corrupted revision");
    }
}
