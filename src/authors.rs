// src/authors.rs

//! Author mapping
//!
//! Legacy usernames are mapped to canonical identities through one or more
//! `key=value` files. Keys are normalized the same way raw authors are, so
//! `JSmith`, `jsmith ` and `JSMITH` all hit the same entry.

use crate::interner::Identities;
use crate::model::RevisionEvent;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AuthorMapError {
    #[error("failed to read author map {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("{path}:{line}: expected key=value, found {text:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("{path}:{line}: duplicate key {key:?}")]
    DuplicateKey {
        path: PathBuf,
        line: usize,
        key: String,
    },
}

/// Normalize a legacy username for lookup
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Canonical identities keyed by normalized legacy username
#[derive(Debug, Default, Clone)]
pub struct AuthorMap {
    entries: HashMap<String, String>,
}

impl AuthorMap {
    /// Load mapping files in order; later files override earlier ones
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, AuthorMapError> {
        let mut map = Self::default();
        for path in paths {
            let path = path.as_ref();
            let text = fs::read_to_string(path).map_err(|source| AuthorMapError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let file_entries = parse_map(path, &text)?;
            debug!("Loaded {} author mappings from {}", file_entries.len(), path.display());
            map.entries.extend(file_entries);
        }
        Ok(map)
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.entries.get(&normalize(raw)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn parse_map(path: &Path, text: &str) -> Result<HashMap<String, String>, AuthorMapError> {
    let mut entries = HashMap::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed.split_once('=').ok_or_else(|| AuthorMapError::Malformed {
            path: path.to_path_buf(),
            line: idx + 1,
            text: line.to_string(),
        })?;
        let key = normalize(key);
        if entries.insert(key.clone(), value.trim().to_string()).is_some() {
            return Err(AuthorMapError::DuplicateKey {
                path: path.to_path_buf(),
                line: idx + 1,
                key,
            });
        }
    }
    Ok(entries)
}

/// Rewrite each revision's author to its canonical identity.
///
/// The raw identity stays in `raw_author`. Returns the raw identities that had
/// no mapping, sorted; those revisions keep their raw author.
pub fn resolve_authors(
    revisions: &mut [RevisionEvent],
    map: &AuthorMap,
    ids: &mut Identities,
) -> BTreeSet<String> {
    let mut unmapped = BTreeSet::new();
    let mut resolved = HashMap::new();

    for rev in revisions.iter_mut() {
        let raw = rev.raw_author;
        let canonical = match resolved.get(&raw) {
            Some(&hit) => hit,
            None => {
                let canonical = map.get(ids.user(raw)).map(str::to_string);
                let hit = canonical.map(|name| ids.users.intern(&name));
                resolved.insert(raw, hit);
                hit
            }
        };
        match canonical {
            Some(user) => rev.author = user,
            None => {
                unmapped.insert(ids.user(raw).to_string());
            }
        }
    }

    if !unmapped.is_empty() {
        warn!("{} legacy identities have no author mapping", unmapped.len());
    }
    unmapped
}
